//! HTTP/1.1 vocabulary used by the dispatch pipeline: [`Method`],
//! [`StatusCode`], [`Headers`], [`MediaType`], the parsed [`Request`] and the
//! committable [`Response`] handle.

use std::fmt;
use std::str::FromStr;

pub mod headers;
pub mod media_type;
pub mod multipart;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use media_type::MediaType;
pub use multipart::{FormData, MultipartError, MultipartFile};
pub use request::{Request, RequestBuilder};
pub use response::Response;

macro_rules! status_codes {
    ($($variant:ident = $code:literal, $reason:literal;)+) => {
        /// The status codes the pipeline can produce or a handler may set.
        ///
        /// ```
        /// use restline::http::StatusCode;
        ///
        /// assert_eq!(StatusCode::TooManyRequests.as_u16(), 429);
        /// assert_eq!(StatusCode::from_u16(503), Some(StatusCode::ServiceUnavailable));
        /// assert_eq!(StatusCode::NotAcceptable.to_string(), "406 Not Acceptable");
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $($variant = $code,)+
        }

        impl StatusCode {
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }
        }
    };
}

status_codes! {
    Continue = 100, "Continue";
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NoContent = 204, "No Content";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PayloadTooLarge = 413, "Payload Too Large";
    UriTooLong = 414, "URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    UnprocessableEntity = 422, "Unprocessable Entity";
    TooManyRequests = 429, "Too Many Requests";
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// 5xx; these are logged at `error` level by the dispatcher.
    pub fn is_server_error(self) -> bool {
        self.as_u16() >= 500
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// A request method. Extension methods are kept verbatim in `Custom`.
///
/// ```
/// use restline::http::Method;
///
/// assert_eq!(Method::from_name("PATCH"), Method::Patch);
/// assert_eq!(Method::from_name("PURGE").as_str(), "PURGE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    Custom(String),
}

const STANDARD_METHODS: [(Method, &str); 9] = [
    (Method::Get, "GET"),
    (Method::Post, "POST"),
    (Method::Put, "PUT"),
    (Method::Delete, "DELETE"),
    (Method::Head, "HEAD"),
    (Method::Options, "OPTIONS"),
    (Method::Patch, "PATCH"),
    (Method::Connect, "CONNECT"),
    (Method::Trace, "TRACE"),
];

impl Method {
    /// Parses a method token. Matching is case-sensitive, as on the wire.
    pub fn from_name(name: &str) -> Self {
        STANDARD_METHODS
            .iter()
            .find(|(_, token)| *token == name)
            .map(|(method, _)| method.clone())
            .unwrap_or_else(|| Self::Custom(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Custom(token) => token,
            standard => STANDARD_METHODS
                .iter()
                .find(|(method, _)| method == standard)
                .map_or("", |(_, token)| *token),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lookup() {
        assert_eq!(StatusCode::from_u16(415), Some(StatusCode::UnsupportedMediaType));
        assert_eq!(StatusCode::from_u16(299), None);
        assert!(StatusCode::ServiceUnavailable.is_server_error());
        assert!(StatusCode::TooManyRequests.is_client_error());
        assert!(!StatusCode::NotFound.is_server_error());
    }

    #[test]
    fn method_tokens() {
        assert_eq!("DELETE".parse::<Method>(), Ok(Method::Delete));
        assert_eq!(Method::from_name("get"), Method::Custom("get".into()));
        assert_eq!(Method::Options.to_string(), "OPTIONS");
        assert_eq!(Method::Custom("PURGE".into()).as_str(), "PURGE");
    }
}
