//! Invocation of handler methods with resolved arguments.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use super::{ArgValue, Args, HandlerMethod, InvokeError, ReturnValue};
use crate::error::WebError;
use crate::http::{Request, Response};

/// Calls a handler method with resolved arguments.
///
/// An argument mismatch becomes a 400 whose message lists the controller,
/// the method signature and every resolved argument; errors raised by the
/// handler pass through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct HandlerInvoker<'a> {
    method: &'a HandlerMethod,
}

impl<'a> HandlerInvoker<'a> {
    pub fn new(method: &'a HandlerMethod) -> Self {
        Self { method }
    }

    pub async fn invoke(
        &self,
        request: Arc<Request>,
        response: Response,
        args: Vec<ArgValue>,
    ) -> Result<ReturnValue, WebError> {
        // Kept for diagnostics; the handler consumes `Args`.
        let resolved = args.clone();
        let call = self
            .method
            .handler()
            .call(Args::new(request, response, args));

        match call.await {
            Ok(value) => Ok(value),
            Err(InvokeError::ArgumentMismatch(text)) => {
                debug!(method = %self.method, "argument mismatch: {text}");
                Err(WebError::BadRequest(self.invocation_message(&text, &resolved)))
            }
            Err(InvokeError::Handler(err)) => Err(err),
        }
    }

    fn invocation_message(&self, text: &str, resolved: &[ArgValue]) -> String {
        let mut message = format!(
            "{text}\nHandlerMethod details: \nController [{}]\nMethod [{}]\nResolved arguments: \n",
            self.method.controller(),
            self.method.signature()
        );
        for (index, value) in resolved.iter().enumerate() {
            if value.is_null() {
                let _ = writeln!(message, "[{index}] [null] ");
            } else {
                let _ = writeln!(message, "[{index}] [type={}]", value.type_name());
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Message;
    use crate::handler::{Param, ParamType};
    use crate::http::{Method, StatusCode};

    fn request() -> Arc<Request> {
        Arc::new(Request::builder(Method::Get, "/").build())
    }

    async fn takes_string(args: Args) -> Result<ReturnValue, InvokeError> {
        let value: String = args.get(0)?;
        Ok(ReturnValue::Text(value))
    }

    async fn fails(_args: Args) -> Result<ReturnValue, InvokeError> {
        Err(WebError::handler(Message::new("foo")).into())
    }

    #[tokio::test]
    async fn mismatch_lists_resolved_arguments() {
        let method = HandlerMethod::new("Echo", "echo", takes_string)
            .param(Param::query("a", ParamType::of::<String>()))
            .param(Param::query("b", ParamType::optional::<String>()));
        let args = vec![ArgValue::of(1_i32), ArgValue::null()];

        let err = HandlerInvoker::new(&method)
            .invoke(request(), Response::new(), args)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BadRequest);
        let msg = err.to_string();
        assert!(msg.contains("HandlerMethod details: \nController [Echo]\n"), "{msg}");
        assert!(msg.contains("Method [echo(alloc::string::String, Option<alloc::string::String>) -> ()]"), "{msg}");
        assert!(msg.ends_with("Resolved arguments: \n[0] [type=i32]\n[1] [null] \n"), "{msg}");
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let method = HandlerMethod::new("Echo", "fails", fails);
        let err = HandlerInvoker::new(&method)
            .invoke(request(), Response::new(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::InternalServerError);
        assert!(err.downcast_ref::<Message>().is_some());
    }
}
