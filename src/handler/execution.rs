//! Lazy binding of a handler method to its resolvers.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{ArgValue, HandlerInvoker, HandlerMethod, ReturnValue};
use crate::error::{BindError, WebError};
use crate::http::{Request, Response};
use crate::resolver::{ArgumentResolver, ResolvedBody, ResolverRegistry, ReturnValueResolver};

/// A handler method plus its resolvers, bound lazily on first dispatch.
///
/// Binding runs at most once successfully; a failed bind is reported and
/// retried on the next request.
pub struct HandlerExecution {
    method: HandlerMethod,
    bound: OnceCell<BoundHandler>,
}

impl HandlerExecution {
    pub fn new(method: HandlerMethod) -> Self {
        Self {
            method,
            bound: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &HandlerMethod {
        &self.method
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Binds one argument resolver per parameter and one return value resolver.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`] if any parameter or the return value has no
    /// supporting resolver, or a resolver fails to build.
    pub fn bind(&self, resolvers: &ResolverRegistry) -> Result<&BoundHandler, BindError> {
        self.bound.get_or_try_init(|| {
            let arguments = self
                .method
                .params()
                .iter()
                .map(|param| resolvers.bind_argument(&self.method, param))
                .collect::<Result<Vec<_>, _>>()?;
            let result = resolvers.bind_return(&self.method)?;
            debug!(method = %self.method, params = arguments.len(), "handler bound");
            Ok(BoundHandler { arguments, result })
        })
    }

    /// Runs the handler with already resolved arguments.
    pub async fn invoke(
        &self,
        request: Arc<Request>,
        response: Response,
        args: Vec<ArgValue>,
    ) -> Result<ReturnValue, WebError> {
        HandlerInvoker::new(&self.method)
            .invoke(request, response, args)
            .await
    }
}

impl fmt::Debug for HandlerExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerExecution")
            .field("method", &self.method)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// The resolvers bound to one handler method.
pub struct BoundHandler {
    arguments: Vec<Box<dyn ArgumentResolver>>,
    result: Box<dyn ReturnValueResolver>,
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("arguments", &self.arguments.len())
            .finish_non_exhaustive()
    }
}

impl BoundHandler {
    /// Resolves every parameter in order, stopping at the first failure.
    pub fn resolve_arguments(
        &self,
        request: &Arc<Request>,
        response: &Response,
    ) -> Result<Vec<ArgValue>, WebError> {
        self.arguments
            .iter()
            .map(|resolver| resolver.resolve(request, response))
            .collect()
    }

    pub fn resolve_return(
        &self,
        value: ReturnValue,
        request: &Request,
        response: &Response,
    ) -> Result<ResolvedBody, WebError> {
        self.result.resolve(value, request, response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::handler::{Args, InvokeError, Param, ParamType};
    use crate::http::{Method, StatusCode};
    use crate::resolver::{ArgumentResolverFactory, ResolverContext};

    async fn echo(args: Args) -> Result<ReturnValue, InvokeError> {
        Ok(ReturnValue::Text(args.get(0)?))
    }

    struct CountingFactory(Arc<AtomicUsize>);

    struct Fixed;

    impl ArgumentResolver for Fixed {
        fn resolve(&self, _: &Arc<Request>, _: &Response) -> Result<ArgValue, WebError> {
            Ok(ArgValue::of(String::from("fixed")))
        }
    }

    impl ArgumentResolverFactory for CountingFactory {
        fn supports(&self, param: &Param) -> bool {
            param.name() == "counted"
        }

        fn order(&self) -> i32 {
            -1
        }

        fn create_resolver(
            &self,
            _param: &Param,
            _ctx: &ResolverContext,
        ) -> Result<Box<dyn ArgumentResolver>, BindError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Fixed))
        }
    }

    #[tokio::test]
    async fn binds_once_and_resolves() {
        let count = Arc::new(AtomicUsize::new(0));
        let resolvers = ResolverRegistry::builder()
            .with_defaults()
            .argument_resolver(CountingFactory(count.clone()))
            .build();
        let execution = HandlerExecution::new(
            HandlerMethod::new("Echo", "echo", echo)
                .param(Param::query("counted", ParamType::of::<String>())),
        );

        let request = Arc::new(Request::builder(Method::Get, "/").build());
        let response = Response::new();
        for _ in 0..3 {
            let bound = execution.bind(&resolvers).unwrap();
            let args = bound.resolve_arguments(&request, &response).unwrap();
            assert_eq!(args[0].get::<String>().as_deref(), Some("fixed"));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(execution.is_bound());
    }

    #[tokio::test]
    async fn first_failure_stops_resolution() {
        let resolvers = ResolverRegistry::with_defaults();
        let execution = HandlerExecution::new(
            HandlerMethod::new("Echo", "echo", echo)
                .param(Param::query("a", ParamType::of::<i32>()))
                .param(Param::query("b", ParamType::of::<i32>())),
        );
        let request = Arc::new(Request::builder(Method::Get, "/?b=x").build());
        let err = execution
            .bind(&resolvers)
            .unwrap()
            .resolve_arguments(&request, &Response::new())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BadRequest);
        assert_eq!(err.to_string(), "missing required value: a");
    }

    #[test]
    fn invalid_default_fails_binding() {
        let resolvers = ResolverRegistry::with_defaults();
        let execution = HandlerExecution::new(
            HandlerMethod::new("Echo", "echo", echo)
                .param(Param::query("n", ParamType::of::<u8>()).default_value("lots")),
        );
        let err = execution.bind(&resolvers).unwrap_err();
        assert!(matches!(err, BindError::InvalidDefault { .. }));
        assert!(!execution.is_bound());
    }
}
