//! HTTP/1.1 request parsing using the [`httparse`] crate.
//!
//! A [`Request`] is shared as `Arc<Request>` between the dispatcher, argument
//! resolvers and route callbacks, so everything the pipeline adds to it
//! (path variables, attributes, the decoded form) goes through interior
//! mutability or one-shot cells.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use thiserror::Error;

use super::multipart::decode_pairs;
use super::{FormData, Headers, MediaType, Method, MultipartError};
use crate::context::{Attributes, PathVariables};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer, or by
/// [`Request::builder`] in tests and embedding code.
///
/// # Examples
///
/// ```
/// use restline::http::Request;
///
/// let raw = b"GET /hello?name=world&tag=a&tag=b HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.query_params("tag"), ["a", "b"]);
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    params: HashMap<String, Vec<String>>,
    body: Bytes,
    /// Bound once, when the route matches.
    path_variables: OnceCell<PathVariables>,
    attributes: Attributes,
    cookies: OnceCell<Vec<(String, String)>>,
    form: OnceCell<FormData>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator). The
    /// body holds whatever bytes follow the headers, capped at `Content-Length`;
    /// transports that buffer incrementally replace it with [`with_body`](Self::with_body).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from_name(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let mut request = Self::assemble(method, raw_path, version, header_map);
        // Without a declared length the request has no body; anything after
        // the head belongs to the next pipelined request.
        let available = &buf[body_offset..];
        let body_len = request
            .content_length()
            .map_or(0, |len| len.min(available.len()));
        request.body = Bytes::copy_from_slice(&available[..body_len]);

        Ok((request, body_offset))
    }

    /// Starts building a request by hand.
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.into(),
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    fn assemble(method: Method, uri: &str, version: u8, headers: Headers) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (uri.to_owned(), None),
        };

        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in query.as_deref().map(decode_pairs).unwrap_or_default() {
            params.entry(key).or_default().push(value);
        }

        Self {
            method,
            path,
            version,
            headers,
            query,
            params,
            body: Bytes::new(),
            path_variables: OnceCell::new(),
            attributes: Attributes::new(),
            cookies: OnceCell::new(),
            form: OnceCell::new(),
        }
    }

    /// Replaces the body, e.g. once a transport has buffered all of it.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self.form = OnceCell::new();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the first decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.first().map(String::as_str)
    }

    /// Returns every decoded value of a query parameter, in order of appearance.
    pub fn query_params(&self, key: &str) -> &[String] {
        self.params.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1, // HTTP/1.1 default: keep-alive
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// The parsed `Content-Type`, if present and well formed.
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers.get("content-type")?.parse().ok()
    }

    /// The `Accept` header in preference order; `*/*` when absent or blank.
    ///
    /// A header whose every entry was refused with `q=0` yields an empty list,
    /// so nothing is acceptable.
    pub fn accept(&self) -> Vec<MediaType> {
        let mut entries = self.headers.get_list("accept").peekable();
        if entries.peek().is_none() {
            return vec![MediaType::all()];
        }
        MediaType::parse_accept(entries)
    }

    /// Binds the variables captured by the matched route pattern.
    ///
    /// Returns `false` if variables were already bound.
    pub fn bind_path_variables(&self, variables: PathVariables) -> bool {
        self.path_variables.set(variables).is_ok()
    }

    /// A variable captured by the matched route pattern.
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get()?.get(name)
    }

    /// All captured path variables (empty before routing).
    pub fn path_variables(&self) -> Option<&PathVariables> {
        self.path_variables.get()
    }

    /// Value of a cookie sent in the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get_or_init(|| parse_cookies(&self.headers))
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The decoded form body, parsed once on first access.
    ///
    /// URL-encoded and multipart bodies are decoded; any other content type
    /// yields an empty form.
    ///
    /// # Errors
    ///
    /// Returns a [`MultipartError`] if a multipart body is malformed.
    pub fn form(&self) -> Result<&FormData, MultipartError> {
        self.form.get_or_try_init(|| {
            let Some(content_type) = self.content_type() else {
                return Ok(FormData::default());
            };
            let essence = content_type.essence();
            if essence == MediaType::application_form_urlencoded().essence() {
                Ok(FormData::from_urlencoded(&self.body))
            } else if essence == MediaType::multipart_form_data().essence() {
                let boundary = content_type
                    .param("boundary")
                    .ok_or(MultipartError::MissingBoundary)?;
                FormData::from_multipart(&self.body, boundary)
            } else {
                Ok(FormData::default())
            }
        })
    }

    /// Request-scoped attributes shared between advices, handlers and callbacks.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .finish()
    }
}

/// Builder for requests that do not come off the wire.
///
/// ```
/// use restline::http::{Method, Request};
///
/// let request = Request::builder(Method::Post, "/users?dry_run=true")
///     .header("Content-Type", "application/json")
///     .body(r#"{"name":"ada"}"#)
///     .build();
/// assert_eq!(request.query_param("dry_run"), Some("true"));
/// assert_eq!(request.body().len(), 14);
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl RequestBuilder {
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a `name=value` pair to the `Cookie` header.
    #[must_use]
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header("Cookie", format!("{name}={value}"))
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the HTTP minor version (`0` for HTTP/1.0).
    #[must_use]
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn build(self) -> Request {
        Request::assemble(self.method, &self.uri, self.version, self.headers).with_body(self.body)
    }
}

fn parse_cookies(headers: &Headers) -> Vec<(String, String)> {
    headers
        .get_all("cookie")
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_owned(), value.trim().trim_matches('"').to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_query_string() {
        let raw = b"GET /search?q=rust+lang&page=2&q=%E2%9C%93 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust+lang&page=2&q=%E2%9C%93"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_params("q"), ["rust lang", "✓"]);
        assert_eq!(req.query_param("page"), Some("2"));
        assert!(req.query_params("missing").is_empty());
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_http11_default() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.is_keep_alive());
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length_caps_body() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhelloGET";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..body_offset + 5], b"hello");
        assert_eq!(req.body().as_ref(), b"hello");
    }

    #[test]
    fn undeclared_body_is_left_for_the_next_request() {
        let raw = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/a");
        assert!(req.body().is_empty());

        let (next, _) = Request::parse(&raw[offset..]).unwrap();
        assert_eq!(next.path(), "/b");
    }

    #[test]
    fn accept_defaults_to_everything() {
        let req = Request::builder(Method::Get, "/").build();
        assert_eq!(req.accept(), vec![MediaType::all()]);

        let req = Request::builder(Method::Get, "/")
            .header("Accept", "text/plain;q=0.5, application/json")
            .build();
        let essences: Vec<_> = req.accept().iter().map(MediaType::essence).collect();
        assert_eq!(essences, vec!["application/json", "text/plain"]);
    }

    #[test]
    fn refused_accept_is_not_everything() {
        let req = Request::builder(Method::Get, "/")
            .header("Accept", "application/json;q=0")
            .build();
        assert!(req.accept().is_empty());

        let req = Request::builder(Method::Get, "/").header("Accept", " , ").build();
        assert_eq!(req.accept(), vec![MediaType::all()]);
    }

    #[test]
    fn cookies_are_parsed_lazily() {
        let req = Request::builder(Method::Get, "/")
            .header("Cookie", "session=abc; theme=\"dark\"")
            .cookie("lang", "en")
            .build();
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("lang"), Some("en"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn path_variables_bind_once() {
        let req = Request::builder(Method::Get, "/users/7").build();
        assert_eq!(req.path_variable("id"), None);

        let mut vars = PathVariables::new();
        vars.insert("id", "7");
        assert!(req.bind_path_variables(vars));
        assert!(!req.bind_path_variables(PathVariables::new()));
        assert_eq!(req.path_variable("id"), Some("7"));
    }

    #[test]
    fn urlencoded_form() {
        let req = Request::builder(Method::Post, "/")
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body("a=1&b=two+words")
            .build();
        let form = req.form().unwrap();
        assert_eq!(form.field_values("b").collect::<Vec<_>>(), vec!["two words"]);
    }

    #[test]
    fn multipart_without_boundary() {
        let req = Request::builder(Method::Post, "/")
            .header("Content-Type", "multipart/form-data")
            .body("irrelevant")
            .build();
        assert_eq!(req.form().unwrap_err(), MultipartError::MissingBoundary);
    }

    #[test]
    fn non_form_body_has_empty_form() {
        let req = Request::builder(Method::Post, "/")
            .header("Content-Type", "application/json")
            .body("{}")
            .build();
        assert!(req.form().unwrap().is_empty());
    }
}
