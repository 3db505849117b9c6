use std::sync::Arc;

use super::{ArgumentResolver, ArgumentResolverFactory, ResolverContext};
use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param, ParamType};
use crate::http::{Request, Response};
use crate::serialize::HIGHEST_PRECEDENCE;

/// Hands the request (`Arc<Request>`) or response handle to the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectedResolverFactory;

impl ArgumentResolverFactory for InjectedResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        matches!(param.ty(), ParamType::Request | ParamType::Response)
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        Ok(Box::new(Injected {
            response: matches!(param.ty(), ParamType::Response),
        }))
    }

    fn order(&self) -> i32 {
        HIGHEST_PRECEDENCE
    }
}

struct Injected {
    response: bool,
}

impl ArgumentResolver for Injected {
    fn resolve(&self, request: &Arc<Request>, response: &Response) -> Result<ArgValue, WebError> {
        if self.response {
            Ok(ArgValue::of(response.clone()))
        } else {
            Ok(ArgValue::of(Arc::clone(request)))
        }
    }
}
