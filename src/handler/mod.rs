//! Handler methods: descriptors, typed argument access, invocation and
//! lazily bound execution.

mod execution;
mod invoker;
mod method;
mod value;

pub use execution::{BoundHandler, HandlerExecution};
pub use invoker::HandlerInvoker;
pub use method::{
    BeanType, BoxFuture, HandlerMethod, MethodHandler, Param, ParamSource, ParamType, RequestBean,
    Scalar,
};
pub use value::{ArgValue, Args, InvokeError, ReturnValue};
