//! Argument resolution SPI.

use std::sync::Arc;

use super::ResolverContext;
use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param};
use crate::http::{Request, Response};

/// Resolves one handler parameter from a request. Bound once per parameter,
/// called once per request.
pub trait ArgumentResolver: Send + Sync + 'static {
    fn resolve(&self, request: &Arc<Request>, response: &Response) -> Result<ArgValue, WebError>;
}

/// Builds [`ArgumentResolver`]s for the parameters it supports.
///
/// Factories are consulted in ascending [`order`](Self::order), ties in
/// registration order; the first whose [`supports`](Self::supports) accepts
/// a parameter builds its resolver.
pub trait ArgumentResolverFactory: Send + Sync + 'static {
    fn supports(&self, param: &Param) -> bool;

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext,
    ) -> Result<Box<dyn ArgumentResolver>, BindError>;

    fn order(&self) -> i32 {
        0
    }
}

/// Hooks around argument resolution.
///
/// Every advice whose [`supports`](Self::supports) accepts a parameter runs
/// for it, in ascending [`order`](Self::order): `before_resolve` calls first,
/// then resolution, then each `after_resolved` with the previous one's output.
pub trait ArgumentResolverAdvice: Send + Sync + 'static {
    fn supports(&self, _param: &Param) -> bool {
        true
    }

    fn order(&self) -> i32 {
        0
    }

    fn before_resolve(&self, _request: &Request, _response: &Response) -> Result<(), WebError> {
        Ok(())
    }

    fn after_resolved(
        &self,
        value: ArgValue,
        _request: &Request,
        _response: &Response,
    ) -> Result<ArgValue, WebError> {
        Ok(value)
    }
}

/// A resolver wrapped with the advices that apply to its parameter.
pub(crate) struct AdvisedArgumentResolver {
    pub(crate) inner: Box<dyn ArgumentResolver>,
    pub(crate) advices: Vec<Arc<dyn ArgumentResolverAdvice>>,
}

impl ArgumentResolver for AdvisedArgumentResolver {
    fn resolve(&self, request: &Arc<Request>, response: &Response) -> Result<ArgValue, WebError> {
        for advice in &self.advices {
            advice.before_resolve(request, response)?;
        }
        let mut value = self.inner.resolve(request, response)?;
        for advice in &self.advices {
            value = advice.after_resolved(value, request, response)?;
        }
        Ok(value)
    }
}
