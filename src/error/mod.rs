//! Error taxonomy for the dispatch pipeline.
//!
//! [`WebError`] is what travels through the pipeline and ends up mapped to a
//! status code. [`BindError`] covers failures while wiring a route's handler
//! to its resolvers; it surfaces as a 500 when a request first hits the route.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::http::StatusCode;

/// An error raised while serving a request.
///
/// Every variant maps to exactly one status via [`WebError::status`].
///
/// # Examples
///
/// ```
/// use restline::error::WebError;
/// use restline::http::StatusCode;
///
/// let err = WebError::BadRequest("missing required value: id".into());
/// assert_eq!(err.status(), StatusCode::BadRequest);
///
/// let io = std::io::Error::other("disk on fire");
/// let err = WebError::handler(io);
/// assert_eq!(err.status(), StatusCode::InternalServerError);
/// assert!(err.downcast_ref::<std::io::Error>().is_some());
/// ```
#[derive(Debug, Clone, Error)]
pub enum WebError {
    /// The request data could not be resolved into handler arguments.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Admission control refused the request.
    #[error("{0}")]
    TooManyRequests(String),

    /// The server is shutting down and will not finish the request.
    #[error("{0}")]
    Unavailable(String),

    /// An error that carries its own status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// The requested output format cannot be produced for this return value.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{0}")]
    Internal(String),

    /// An arbitrary error raised by handler code.
    #[error("{0}")]
    Handler(Arc<dyn StdError + Send + Sync>),
}

impl WebError {
    /// Wraps any error raised by handler code.
    pub fn handler<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Handler(Arc::new(error))
    }

    /// An error with an explicit status.
    pub fn status_with(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::status_with(StatusCode::NotAcceptable, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::status_with(StatusCode::UnsupportedMediaType, message)
    }

    /// The status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BadRequest,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::TooManyRequests(_) => StatusCode::TooManyRequests,
            Self::Unavailable(_) => StatusCode::ServiceUnavailable,
            Self::Status { status, .. } => *status,
            Self::UnsupportedOperation(_) | Self::Internal(_) | Self::Handler(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    /// Downcasts a wrapped handler error.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Handler(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Messages of the underlying cause chain of a wrapped handler error,
    /// outermost first (the error's own message excluded).
    pub fn causes(&self) -> Vec<String> {
        let Self::Handler(inner) = self else {
            return Vec::new();
        };
        let mut causes = Vec::new();
        let mut source = inner.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        causes
    }
}

/// A failure while binding a handler method to its resolvers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("no argument resolver supports parameter [{index}] '{name}' of {method}")]
    NoArgumentResolver {
        method: String,
        index: usize,
        name: String,
    },

    #[error("no return value resolver supports {method}")]
    NoReturnValueResolver { method: String },

    #[error("invalid default value {value:?} for parameter '{name}': {reason}")]
    InvalidDefault {
        name: String,
        value: String,
        reason: String,
    },

    #[error("serializer '{serializer}' required by {method} is not registered")]
    MissingSerializer { method: String, serializer: String },

    #[error("parameter '{name}' of type {type_name} cannot be read from the request body")]
    UnreadableEntity { name: String, type_name: String },
}

impl From<BindError> for WebError {
    fn from(err: BindError) -> Self {
        WebError::Internal(err.to_string())
    }
}

/// A plain message error for handlers that have nothing better to raise.
///
/// ```
/// use restline::error::{Message, WebError};
///
/// let err = WebError::handler(Message::new("foo"));
/// assert_eq!(err.to_string(), "foo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(String);

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn statuses() {
        assert_eq!(WebError::NotFound("x".into()).status(), StatusCode::NotFound);
        assert_eq!(WebError::TooManyRequests("x".into()).status(), StatusCode::TooManyRequests);
        assert_eq!(WebError::Unavailable("x".into()).status(), StatusCode::ServiceUnavailable);
        assert_eq!(
            WebError::UnsupportedOperation("pb".into()).status(),
            StatusCode::InternalServerError
        );
        assert_eq!(WebError::not_acceptable("x").status(), StatusCode::NotAcceptable);
        assert_eq!(
            WebError::unsupported_media_type("x").status(),
            StatusCode::UnsupportedMediaType
        );
    }

    #[test]
    fn handler_causes() {
        let err = WebError::handler(Outer {
            inner: std::io::Error::other("disk"),
        });
        assert_eq!(err.to_string(), "outer");
        assert_eq!(err.causes(), vec!["disk".to_string()]);
        assert!(err.downcast_ref::<Outer>().is_some());
        assert!(err.downcast_ref::<Message>().is_none());
    }

    #[test]
    fn bind_errors_are_internal() {
        let err: WebError = BindError::NoReturnValueResolver {
            method: "Hello#world".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::InternalServerError);
        assert!(err.to_string().contains("Hello#world"));
    }
}
