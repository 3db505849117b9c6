//! Name/value resolvers: query parameters, headers, path variables, cookies
//! and form fields.

use std::sync::Arc;

use super::{ArgumentResolver, ArgumentResolverFactory, NameAndValue, ResolverContext};
use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param, ParamSource, ParamType};
use crate::http::{Request, Response};

/// Builds resolvers for text-convertible parameters read by name from one
/// part of the request.
///
/// Multi-valued sources (repeated query parameters, repeated headers, form
/// fields) hand every value to list-typed parameters and the first one to
/// everything else.
#[derive(Debug, Clone, Copy)]
pub struct NameValueResolverFactory {
    source: ParamSource,
}

impl NameValueResolverFactory {
    pub fn query() -> Self {
        Self {
            source: ParamSource::Query,
        }
    }

    pub fn header() -> Self {
        Self {
            source: ParamSource::Header,
        }
    }

    pub fn path() -> Self {
        Self {
            source: ParamSource::Path,
        }
    }

    pub fn cookie() -> Self {
        Self {
            source: ParamSource::Cookie,
        }
    }

    /// Form fields; also serves text multipart parts.
    pub fn form() -> Self {
        Self {
            source: ParamSource::Form,
        }
    }
}

impl ArgumentResolverFactory for NameValueResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        let source_matches = match self.source {
            ParamSource::Form => matches!(param.source(), ParamSource::Form | ParamSource::Part),
            source => param.source() == source,
        };
        source_matches && param.ty().is_text_convertible()
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        Ok(Box::new(NameValueResolver {
            source: self.source,
            ty: *param.ty(),
            nv: NameAndValue::for_param(param)?,
        }))
    }
}

struct NameValueResolver {
    source: ParamSource,
    ty: ParamType,
    nv: NameAndValue,
}

impl NameValueResolver {
    fn lookup(&self, request: &Request) -> Result<Vec<String>, WebError> {
        let name = self.nv.name();
        let values = match self.source {
            ParamSource::Query => request.query_params(name).to_vec(),
            ParamSource::Header if matches!(self.ty, ParamType::List(_)) => {
                request.headers().get_list(name).map(str::to_owned).collect()
            }
            ParamSource::Header => request.headers().get_all(name).map(str::to_owned).collect(),
            ParamSource::Path => request.path_variable(name).map(str::to_owned).into_iter().collect(),
            ParamSource::Cookie => request.cookie(name).map(str::to_owned).into_iter().collect(),
            _ => request
                .form()
                .map_err(|e| WebError::BadRequest(format!("malformed form body: {e}")))?
                .field_values(name)
                .map(str::to_owned)
                .collect(),
        };
        Ok(values)
    }
}

impl ArgumentResolver for NameValueResolver {
    fn resolve(&self, request: &Arc<Request>, _response: &Response) -> Result<ArgValue, WebError> {
        let values = self.lookup(request)?;
        if values.is_empty() {
            return self.nv.on_absent();
        }
        self.ty.convert(&values).map_err(|reason| {
            WebError::BadRequest(format!(
                "failed to convert value of '{}': {reason}",
                self.nv.name()
            ))
        })
    }
}
