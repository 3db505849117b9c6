//! Multipart file parameters.

use std::sync::Arc;

use super::{ArgumentResolver, ArgumentResolverFactory, NameAndValue, ResolverContext};
use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param, ParamSource, ParamType};
use crate::http::{MultipartFile, Request, Response};

/// Resolves [`ParamType::File`] and [`ParamType::Files`] parameters from a
/// `multipart/form-data` body. Lists keep submission order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartFileResolverFactory;

impl ArgumentResolverFactory for MultipartFileResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        matches!(param.source(), ParamSource::Part | ParamSource::Form)
            && matches!(param.ty(), ParamType::File | ParamType::Files)
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        Ok(Box::new(MultipartFileResolver {
            many: matches!(param.ty(), ParamType::Files),
            nv: NameAndValue::for_param(param)?,
        }))
    }
}

struct MultipartFileResolver {
    many: bool,
    nv: NameAndValue,
}

impl ArgumentResolver for MultipartFileResolver {
    fn resolve(&self, request: &Arc<Request>, _response: &Response) -> Result<ArgValue, WebError> {
        let form = request
            .form()
            .map_err(|e| WebError::BadRequest(format!("malformed multipart body: {e}")))?;

        if !self.many {
            return match form.file(self.nv.name()) {
                Some(file) => Ok(ArgValue::of(file.clone())),
                None => self.nv.on_absent(),
            };
        }
        let files: Vec<MultipartFile> = form.files(self.nv.name()).cloned().collect();
        if files.is_empty() {
            return self.nv.on_absent();
        }
        Ok(ArgValue::of(files))
    }
}
