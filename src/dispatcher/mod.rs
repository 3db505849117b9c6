//! The request dispatch pipeline.
//!
//! Registered [`Filter`]s run first, in order, and may answer a request
//! themselves. Each request that gets past them moves through
//! `ROUTING → RESOLVING_ARGS → INVOKING → RESOLVING_RETURN → COMPLETING → DONE`,
//! with any failure diverting to error handling before `COMPLETING`. Every
//! [`RequestTask`] gets exactly one committed response and one completed
//! promise, whichever way it ends.

mod admission;
mod exception;
mod filter;
mod task;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use tracing::{Instrument, debug, info, info_span, warn};

pub use exception::{DefaultExceptionHandler, ErrorBody, ExceptionHandler, HandleStatus};
pub use filter::{Filter, FilterChain};
pub use task::{Completer, Completion, Outcome, Promise, RequestTask};

use crate::config::DispatcherConfig;
use crate::error::WebError;
use crate::handler::HandlerExecution;
use crate::http::{Request, Response};
use crate::resolver::{ResolvedBody, ResolverRegistry};
use crate::route::{Route, RouteHandler, RouteMatch, RouteRegistry};

// Which branch of the error path a failure takes.
enum Failure {
    // The handler could not be bound; `on_error` is skipped.
    Binding(WebError),
    // Anything after binding; `on_error` gets a say.
    Pipeline(WebError),
}

/// Routes requests and drives them through the pipeline.
pub struct Dispatcher {
    routes: RouteRegistry,
    resolvers: ResolverRegistry,
    filters: Vec<Arc<dyn Filter>>,
    exception_handlers: Vec<Arc<dyn ExceptionHandler>>,
    rejected: AtomicU64,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn new(config: &DispatcherConfig) -> Self {
        Self::builder().config(config.clone()).build()
    }

    /// Registers a route.
    pub fn route(&self, route: Route) -> &Self {
        self.routes.register(route);
        self
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Runs one task to completion.
    pub async fn service(&self, task: RequestTask) {
        let request = Arc::clone(task.request());
        let response = task.response().clone();
        let span = info_span!("dispatch", method = %request.method(), path = request.path());

        async {
            let started = Instant::now();
            let error = FilterChain::new(&self.filters, self)
                .do_filter(&request, &response)
                .await;
            if !response.is_committed() {
                // A filter answered without reaching the pipeline.
                if let Some(e) = &error {
                    self.handle_exception(&request, &response, e);
                }
                response.commit();
            }
            info!(
                "{} {} - {} ({:?})",
                request.method(),
                request.path(),
                response.status().as_u16(),
                started.elapsed()
            );
            task.finish(error);
        }
        .instrument(span)
        .await
    }

    /// Convenience over [`service`](Self::service) for callers without a
    /// transport: returns the committed response and the outcome.
    pub async fn dispatch(&self, request: Request) -> (Response, Outcome) {
        let (task, completion) = RequestTask::new(request);
        let response = task.response().clone();
        self.service(task).await;
        let outcome = completion
            .await
            .unwrap_or_else(|| Outcome::new(response.status(), None));
        (response, outcome)
    }

    async fn process(&self, request: &Arc<Request>, response: &Response) -> Option<WebError> {
        let Some(RouteMatch { route, variables }) = self.routes.match_route(request) else {
            let error = WebError::NotFound(format!(
                "no route for {} {}",
                request.method(),
                request.path()
            ));
            self.handle_exception(request, response, &error);
            response.commit();
            return Some(error);
        };
        request.bind_path_variables(variables);

        let terminal = match self.execute(&route, request, response).await {
            Ok(()) => None,
            Err(Failure::Binding(error)) => Some(error),
            Err(Failure::Pipeline(error)) => self.on_error(&route, request, response, error),
        };

        if let Some(error) = &terminal {
            self.handle_exception(request, response, error);
        }
        // An exception handler may claim an error without sending anything.
        response.commit();

        if let Some(on_complete) = route.complete_callback() {
            if let Err(error) = on_complete(request, response, terminal.as_ref()) {
                warn!(%error, "on_complete failed; ignored");
            }
        }
        terminal
    }

    fn on_error(
        &self,
        route: &Route,
        request: &Request,
        response: &Response,
        error: WebError,
    ) -> Option<WebError> {
        let Some(on_error) = route.error_callback() else {
            return Some(error);
        };
        match on_error(request, response, &error) {
            Ok(()) => {
                debug!(%error, "error handled by route");
                None
            }
            Err(replacement) => Some(replacement),
        }
    }

    async fn execute(
        &self,
        route: &Route,
        request: &Arc<Request>,
        response: &Response,
    ) -> Result<(), Failure> {
        match route.handler() {
            RouteHandler::Noop => Ok(()),
            RouteHandler::Sync(handler) => handler(request, response).map_err(Failure::Pipeline),
            RouteHandler::Async(handler) => {
                let (completer, completion) = Completer::channel();
                handler(Arc::clone(request), response.clone(), completer);
                match completion.await {
                    Some(result) => result.map_err(Failure::Pipeline),
                    None => Err(Failure::Pipeline(WebError::Internal(
                        "async handler dropped its completer without signalling".to_owned(),
                    ))),
                }
            }
            RouteHandler::Method(execution) => {
                self.execute_method(execution, request, response).await
            }
        }
    }

    async fn execute_method(
        &self,
        execution: &HandlerExecution,
        request: &Arc<Request>,
        response: &Response,
    ) -> Result<(), Failure> {
        let bound = execution.bind(&self.resolvers).map_err(|error| {
            warn!(method = %execution.method(), %error, "failed to bind handler");
            Failure::Binding(error.into())
        })?;

        debug!(method = %execution.method(), "resolving arguments");
        let args = bound
            .resolve_arguments(request, response)
            .map_err(Failure::Pipeline)?;

        let value = execution
            .invoke(Arc::clone(request), response.clone(), args)
            .await
            .map_err(Failure::Pipeline)?;

        debug!(method = %execution.method(), "resolving return value");
        match bound
            .resolve_return(value, request, response)
            .map_err(Failure::Pipeline)?
        {
            ResolvedBody::Payload {
                content_type,
                bytes,
            } => {
                if !response.has_content_type() {
                    response.set_header("Content-Type", content_type.to_string());
                }
                response.set_body(bytes);
            }
            ResolvedBody::AlreadyWritten | ResolvedBody::Empty => {}
        }
        Ok(())
    }

    fn handle_exception(&self, request: &Request, response: &Response, error: &WebError) {
        if error.status().is_server_error() {
            warn!(%error, "request failed");
        } else {
            debug!(%error, "request failed");
        }
        for handler in &self.exception_handlers {
            if handler.handle(request, response, error) == HandleStatus::Handled {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes)
            .field("resolvers", &self.resolvers)
            .field("filters", &self.filters.len())
            .field("exception_handlers", &self.exception_handlers.len())
            .field("rejected", &self.reject_count())
            .finish()
    }
}

/// Builds a [`Dispatcher`].
///
/// Without explicit resolvers, the built-in set is used with the configured
/// format parameter.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    resolvers: Option<ResolverRegistry>,
    filters: Vec<Arc<dyn Filter>>,
    exception_handlers: Vec<Arc<dyn ExceptionHandler>>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn exception_handler(mut self, handler: impl ExceptionHandler) -> Self {
        self.exception_handlers.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Dispatcher {
        let Self {
            config,
            resolvers,
            mut filters,
            mut exception_handlers,
        } = self;
        let resolvers = resolvers.unwrap_or_else(|| {
            ResolverRegistry::builder()
                .with_defaults()
                .format_parameter(config.format_parameter.clone())
                .build()
        });
        exception_handlers.push(Arc::new(DefaultExceptionHandler::new(
            config.include_error_causes,
        )));
        exception_handlers.sort_by_key(|h| h.order());
        filters.sort_by_key(|f| f.order());

        Dispatcher {
            routes: RouteRegistry::new(),
            resolvers,
            filters,
            exception_handlers,
            rejected: AtomicU64::new(0),
        }
    }
}
