//! Error to response mapping.

use serde::Serialize;
use tracing::debug;

use crate::error::WebError;
use crate::http::{MediaType, Request, Response, StatusCode};

/// Whether an [`ExceptionHandler`] dealt with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Handled,
    Continue,
}

/// Writes the response for a failed request.
///
/// Handlers run in ascending order until one returns
/// [`HandleStatus::Handled`]; the [`DefaultExceptionHandler`] runs last.
pub trait ExceptionHandler: Send + Sync + 'static {
    fn order(&self) -> i32 {
        0
    }

    fn handle(&self, request: &Request, response: &Response, error: &WebError) -> HandleStatus;
}

/// JSON error document.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody<'a> {
    pub status: u16,
    pub error: &'a str,
    pub message: String,
    pub path: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl<'a> ErrorBody<'a> {
    pub fn new(status: StatusCode, message: String, path: &'a str) -> Self {
        Self {
            status: status.as_u16(),
            error: status.canonical_reason(),
            message,
            path,
            causes: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Only strings and integers; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Uses the error's own status (500 when it carries none) and writes an
/// [`ErrorBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExceptionHandler {
    include_causes: bool,
}

impl DefaultExceptionHandler {
    pub fn new(include_causes: bool) -> Self {
        Self { include_causes }
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn order(&self) -> i32 {
        i32::MAX
    }

    fn handle(&self, request: &Request, response: &Response, error: &WebError) -> HandleStatus {
        let status = error.status();
        let mut body = ErrorBody::new(status, error.to_string(), request.path());
        if self.include_causes {
            body.causes = error.causes();
        }
        let content_type = MediaType::application_json().to_string();
        if !response.send(status, Some(&content_type), body.to_bytes()) {
            debug!(%status, "response already committed; error body dropped");
        }
        HandleStatus::Handled
    }
}
