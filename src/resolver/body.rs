//! Request body resolution: text, raw bytes, or a deserialized entity.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::{ArgumentResolver, ArgumentResolverFactory, NameAndValue, ResolverContext};
use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param, ParamSource, ParamType};
use crate::http::{MediaType, Request, Response};
use crate::serialize::{EntityType, HttpBodySerializer};

/// Resolves `ParamSource::Body` parameters.
///
/// Text-convertible types read the body as UTF-8 (raw `Bytes` as-is).
/// Entity types go through the first serializer, in precedence order, that
/// can read the request's `Content-Type` (JSON when absent); no such
/// serializer means 415. An empty body falls back to the parameter's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBodyResolverFactory;

impl ArgumentResolverFactory for RequestBodyResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.source() == ParamSource::Body
            && (param.ty().is_text_convertible() || matches!(param.ty(), ParamType::Entity(_)))
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        let nv = NameAndValue::for_param(param)?;
        let resolver: Box<dyn ArgumentResolver> = match *param.ty() {
            ParamType::Entity(ty) => {
                if !ty.is_readable() {
                    return Err(BindError::UnreadableEntity {
                        name: param.name().to_owned(),
                        type_name: ty.type_name().to_owned(),
                    });
                }
                Box::new(EntityBodyResolver {
                    nv,
                    ty,
                    serializers: ctx.serializers().to_vec(),
                })
            }
            ty => Box::new(TextBodyResolver { nv, ty }),
        };
        Ok(resolver)
    }
}

struct TextBodyResolver {
    nv: NameAndValue,
    ty: ParamType,
}

impl ArgumentResolver for TextBodyResolver {
    fn resolve(&self, request: &Arc<Request>, _response: &Response) -> Result<ArgValue, WebError> {
        let body = request.body();
        if body.is_empty() {
            return self.nv.on_absent();
        }
        if let ParamType::Bytes = self.ty {
            return Ok(ArgValue::of(Bytes::clone(body)));
        }
        let text = std::str::from_utf8(body)
            .map_err(|e| WebError::BadRequest(format!("request body is not valid UTF-8: {e}")))?;
        self.ty.convert(&[text.to_owned()]).map_err(|reason| {
            WebError::BadRequest(format!("failed to convert request body: {reason}"))
        })
    }
}

struct EntityBodyResolver {
    nv: NameAndValue,
    ty: EntityType,
    serializers: Vec<Arc<dyn HttpBodySerializer>>,
}

impl ArgumentResolver for EntityBodyResolver {
    fn resolve(&self, request: &Arc<Request>, _response: &Response) -> Result<ArgValue, WebError> {
        let body = request.body();
        if body.is_empty() {
            return self.nv.on_absent();
        }

        let media_type = request
            .content_type()
            .unwrap_or_else(MediaType::application_json);
        let serializer = self
            .serializers
            .iter()
            .find(|s| s.supports_read(&media_type, &self.ty))
            .ok_or_else(|| {
                WebError::unsupported_media_type(format!(
                    "content type '{}' is not supported for {}",
                    media_type.essence(),
                    self.ty.simple_name()
                ))
            })?;

        debug!(serializer = serializer.name(), ty = self.ty.type_name(), "reading request body");
        let value = serializer
            .deserialize(body, &self.ty)
            .map_err(|e| WebError::BadRequest(format!("malformed request body: {e}")))?;
        self.ty
            .decode(value)
            .map_err(|e| WebError::BadRequest(format!("malformed request body: {e}")))
    }
}
