//! Request beans: one parameter assembled from several resolved fields.

use std::sync::Arc;

use super::ArgumentResolver;
use crate::error::WebError;
use crate::handler::{ArgValue, Args, BeanType, InvokeError};
use crate::http::{Request, Response};

/// Resolves every field of a bean, in order, then assembles it.
pub(crate) struct BeanResolver {
    pub(crate) ty: BeanType,
    pub(crate) fields: Vec<Box<dyn ArgumentResolver>>,
}

impl ArgumentResolver for BeanResolver {
    fn resolve(&self, request: &Arc<Request>, response: &Response) -> Result<ArgValue, WebError> {
        let values = self
            .fields
            .iter()
            .map(|field| field.resolve(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        self.ty
            .assemble(Args::new(Arc::clone(request), response.clone(), values))
            .map_err(|e| match e {
                InvokeError::ArgumentMismatch(text) => WebError::BadRequest(format!(
                    "cannot assemble {}: {text}",
                    self.ty.type_name()
                )),
                InvokeError::Handler(error) => error,
            })
    }
}
