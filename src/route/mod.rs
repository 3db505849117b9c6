//! Routes: a mapping predicate, one handler and optional lifecycle callbacks.
//!
//! ```rust,no_run
//! use restline::http::MediaType;
//! use restline::route::{Mapping, Route};
//!
//! let route = Route::new(Mapping::get("/users/:id").produces(MediaType::application_json()))
//!     .handle(|_request, response| {
//!         response.set_body("{}");
//!         Ok(())
//!     })
//!     .on_complete(|request, _response, error| {
//!         tracing::debug!(path = request.path(), failed = error.is_some(), "done");
//!         Ok(())
//!     });
//! ```

mod pattern;
mod registry;

use std::fmt;
use std::sync::Arc;

pub use pattern::{PathPattern, WILDCARD};
pub use registry::{RouteMatch, RouteRegistry};

use crate::context::PathVariables;
use crate::dispatcher::Completer;
use crate::error::WebError;
use crate::handler::{HandlerExecution, HandlerMethod};
use crate::http::{MediaType, Method, Request, Response};

/// Synchronous handler body.
pub type SyncHandler =
    Arc<dyn Fn(&Arc<Request>, &Response) -> Result<(), WebError> + Send + Sync + 'static>;

/// Signal-based handler body; reports through the [`Completer`] exactly once.
pub type AsyncHandler = Arc<dyn Fn(Arc<Request>, Response, Completer) + Send + Sync + 'static>;

/// Called with the pipeline error. `Ok` marks it handled; `Err` replaces it.
pub type ErrorCallback =
    Arc<dyn Fn(&Request, &Response, &WebError) -> Result<(), WebError> + Send + Sync + 'static>;

/// Called once per request with the terminal error, if any.
pub type CompleteCallback = Arc<
    dyn Fn(&Request, &Response, Option<&WebError>) -> Result<(), WebError> + Send + Sync + 'static,
>;

/// Which requests a route accepts.
#[derive(Debug, Clone)]
pub struct Mapping {
    pattern: PathPattern,
    methods: Vec<Method>,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
}

impl Mapping {
    /// Any method on `path`.
    pub fn new(path: &str) -> Self {
        Self {
            pattern: PathPattern::parse(path),
            methods: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(path).method(Method::Get)
    }

    pub fn post(path: &str) -> Self {
        Self::new(path).method(Method::Post)
    }

    pub fn put(path: &str) -> Self {
        Self::new(path).method(Method::Put)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(path).method(Method::Delete)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(path).method(Method::Patch)
    }

    /// Adds an accepted method. No methods means any method.
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Adds a `Content-Type` the route accepts.
    pub fn consumes(mut self, media_type: MediaType) -> Self {
        self.consumes.push(media_type);
        self
    }

    /// Adds a media type the route can produce, checked against `Accept`.
    pub fn produces(mut self, media_type: MediaType) -> Self {
        self.produces.push(media_type);
        self
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Matches method, path, `Content-Type` and `Accept`. A request without
    /// `Content-Type` counts as `application/octet-stream`.
    pub fn matches(&self, request: &Request) -> Option<PathVariables> {
        if !self.methods.is_empty() && !self.methods.contains(request.method()) {
            return None;
        }
        let variables = self.pattern.matches(request.path())?;

        if !self.consumes.is_empty() {
            let content_type = request
                .content_type()
                .unwrap_or_else(MediaType::application_octet_stream);
            if !self.consumes.iter().any(|c| c.includes(&content_type)) {
                return None;
            }
        }
        if !self.produces.is_empty() {
            let accepted = request.accept();
            let producible = accepted
                .iter()
                .any(|a| self.produces.iter().any(|p| p.is_compatible_with(a)));
            if !producible {
                return None;
            }
        }
        Some(variables)
    }

    pub(crate) fn media_constraints(&self) -> usize {
        self.consumes.len() + self.produces.len()
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.methods.is_empty() {
            write!(f, "* {}", self.pattern)
        } else {
            let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
            write!(f, "{} {}", methods.join("|"), self.pattern)
        }
    }
}

/// What a route runs once matched.
#[derive(Clone)]
pub enum RouteHandler {
    /// Leaves the response as is (200, empty).
    Noop,
    Sync(SyncHandler),
    Async(AsyncHandler),
    /// A handler method with lazily bound resolvers.
    Method(Arc<HandlerExecution>),
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("Noop"),
            Self::Sync(_) => f.write_str("Sync"),
            Self::Async(_) => f.write_str("Async"),
            Self::Method(execution) => f.debug_tuple("Method").field(execution).finish(),
        }
    }
}

/// A registered route; immutable once registered.
#[derive(Clone)]
pub struct Route {
    mapping: Mapping,
    handler: RouteHandler,
    on_error: Option<ErrorCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Route {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            mapping,
            handler: RouteHandler::Noop,
            on_error: None,
            on_complete: None,
        }
    }

    pub fn handle<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Arc<Request>, &Response) -> Result<(), WebError> + Send + Sync + 'static,
    {
        self.handler = RouteHandler::Sync(Arc::new(handler));
        self
    }

    pub fn handle_async<F>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Request>, Response, Completer) + Send + Sync + 'static,
    {
        self.handler = RouteHandler::Async(Arc::new(handler));
        self
    }

    pub fn handler_method(mut self, method: HandlerMethod) -> Self {
        self.handler = RouteHandler::Method(Arc::new(HandlerExecution::new(method)));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request, &Response, &WebError) -> Result<(), WebError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request, &Response, Option<&WebError>) -> Result<(), WebError>
            + Send
            + Sync
            + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn error_callback(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }

    pub fn complete_callback(&self) -> Option<&CompleteCallback> {
        self.on_complete.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("mapping", &self.mapping.to_string())
            .field("handler", &self.handler)
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str) -> Request {
        Request::builder(method, uri).build()
    }

    #[test]
    fn method_filter() {
        let mapping = Mapping::get("/a");
        assert!(mapping.matches(&request(Method::Get, "/a")).is_some());
        assert!(mapping.matches(&request(Method::Post, "/a")).is_none());

        let any = Mapping::new("/a");
        assert!(any.matches(&request(Method::Delete, "/a")).is_some());
    }

    #[test]
    fn consumes_checks_content_type() {
        let mapping = Mapping::post("/a").consumes(MediaType::application_json());
        let json = Request::builder(Method::Post, "/a")
            .header("Content-Type", "application/json; charset=utf-8")
            .build();
        assert!(mapping.matches(&json).is_some());
        assert!(mapping.matches(&request(Method::Post, "/a")).is_none());

        let raw = Mapping::post("/a").consumes(MediaType::application_octet_stream());
        assert!(raw.matches(&request(Method::Post, "/a")).is_some());
    }

    #[test]
    fn produces_checks_accept() {
        let mapping = Mapping::get("/a").produces(MediaType::application_json());
        let xml = Request::builder(Method::Get, "/a")
            .header("Accept", "application/xml")
            .build();
        assert!(mapping.matches(&xml).is_none());
        // No Accept means */*.
        assert!(mapping.matches(&request(Method::Get, "/a")).is_some());
    }

    #[test]
    fn display() {
        let mapping = Mapping::get("/users/:id").method(Method::Head);
        assert_eq!(mapping.to_string(), "GET|HEAD /users/:id");
        assert_eq!(Mapping::new("/x/").to_string(), "* /x");
    }
}
