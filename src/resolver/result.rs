//! Return value resolution: turning what a handler returned into body bytes.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::ResolverContext;
use crate::error::{BindError, WebError};
use crate::handler::{HandlerMethod, ReturnValue};
use crate::http::{MediaType, Request, Response};
use crate::serialize::{EntityType, HttpBodySerializer, LOWEST_PRECEDENCE};

/// The outcome of return value resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBody {
    /// Bytes to emit, with the content type to use unless the handler set one.
    Payload {
        content_type: MediaType,
        bytes: Bytes,
    },
    /// The handler wrote the body itself.
    AlreadyWritten,
    /// No body.
    Empty,
}

/// Converts a handler's return value into a response body. Bound once per
/// handler method.
pub trait ReturnValueResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        value: ReturnValue,
        request: &Request,
        response: &Response,
    ) -> Result<ResolvedBody, WebError>;
}

/// Builds [`ReturnValueResolver`]s; selected like argument resolver factories.
pub trait ReturnValueResolverFactory: Send + Sync + 'static {
    fn supports(&self, method: &HandlerMethod) -> bool;

    fn create_resolver(
        &self,
        method: &HandlerMethod,
        ctx: &ResolverContext,
    ) -> Result<Box<dyn ReturnValueResolver>, BindError>;

    fn order(&self) -> i32 {
        0
    }
}

/// Rewrites a return value before it is resolved.
pub trait ReturnValueResolverAdvice: Send + Sync + 'static {
    fn supports(&self, _method: &HandlerMethod) -> bool {
        true
    }

    fn order(&self) -> i32 {
        0
    }

    fn before_resolve(
        &self,
        value: ReturnValue,
        _request: &Request,
        _response: &Response,
    ) -> Result<ReturnValue, WebError> {
        Ok(value)
    }
}

pub(crate) struct AdvisedReturnValueResolver {
    pub(crate) inner: Box<dyn ReturnValueResolver>,
    pub(crate) advices: Vec<Arc<dyn ReturnValueResolverAdvice>>,
}

impl ReturnValueResolver for AdvisedReturnValueResolver {
    fn resolve(
        &self,
        mut value: ReturnValue,
        request: &Request,
        response: &Response,
    ) -> Result<ResolvedBody, WebError> {
        for advice in &self.advices {
            value = advice.before_resolve(value, request, response)?;
        }
        self.inner.resolve(value, request, response)
    }
}

/// Emits self-describing values directly; hands entities back.
fn self_describing(value: ReturnValue) -> Result<ResolvedBody, (EntityType, serde_json::Value)> {
    let utf8_text = || MediaType::text_plain().with_param("charset", "utf-8");
    match value {
        ReturnValue::Void => Ok(ResolvedBody::Empty),
        ReturnValue::Written => Ok(ResolvedBody::AlreadyWritten),
        ReturnValue::Text(text) | ReturnValue::Scalar(text) => Ok(ResolvedBody::Payload {
            content_type: utf8_text(),
            bytes: Bytes::from(text),
        }),
        ReturnValue::Bytes(bytes) => Ok(ResolvedBody::Payload {
            content_type: MediaType::application_octet_stream(),
            bytes,
        }),
        ReturnValue::Entity { ty, value } => Err((ty, value)),
    }
}

fn write_entity(
    serializer: &dyn HttpBodySerializer,
    ty: &EntityType,
    value: &serde_json::Value,
) -> Result<ResolvedBody, WebError> {
    debug!(serializer = serializer.name(), ty = ty.type_name(), "writing entity");
    let bytes = serializer.serialize(value, ty).map_err(|e| {
        WebError::Internal(format!("failed to serialize {}: {e}", ty.simple_name()))
    })?;
    Ok(ResolvedBody::Payload {
        content_type: serializer.media_type(),
        bytes,
    })
}

/// The format explicitly requested through the override query parameter.
fn requested_format<'r>(format_parameter: Option<&str>, request: &'r Request) -> Option<&'r str> {
    request.query_param(format_parameter?)
}

/// Picks a serializer from the format override or, failing that, `Accept`.
///
/// Serves every method without a pinned serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiatingResolverFactory;

impl ReturnValueResolverFactory for NegotiatingResolverFactory {
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.serializer().is_none()
    }

    fn create_resolver(
        &self,
        _method: &HandlerMethod,
        ctx: &ResolverContext,
    ) -> Result<Box<dyn ReturnValueResolver>, BindError> {
        Ok(Box::new(NegotiatingResolver {
            serializers: ctx.serializers().to_vec(),
            format_parameter: ctx.format_parameter().map(str::to_owned),
        }))
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

struct NegotiatingResolver {
    serializers: Vec<Arc<dyn HttpBodySerializer>>,
    format_parameter: Option<String>,
}

impl NegotiatingResolver {
    fn negotiate(
        &self,
        ty: &EntityType,
        request: &Request,
    ) -> Result<&dyn HttpBodySerializer, WebError> {
        if let Some(format) = requested_format(self.format_parameter.as_deref(), request) {
            let media_type = MediaType::for_format(format).ok_or_else(|| {
                WebError::UnsupportedOperation(format!("unknown format '{format}'"))
            })?;
            return self
                .serializers
                .iter()
                .find(|s| s.supports_write(&media_type, ty))
                .map(|s| s.as_ref())
                .ok_or_else(|| {
                    WebError::UnsupportedOperation(format!(
                        "no serializer writes {} as '{}'",
                        ty.simple_name(),
                        media_type.essence()
                    ))
                });
        }

        let accepted = request.accept();
        for media_type in &accepted {
            if let Some(serializer) = self
                .serializers
                .iter()
                .find(|s| s.supports_write(media_type, ty))
            {
                return Ok(serializer.as_ref());
            }
        }
        let accepted: Vec<String> = accepted.iter().map(ToString::to_string).collect();
        Err(WebError::not_acceptable(format!(
            "cannot produce {} for Accept [{}]",
            ty.simple_name(),
            accepted.join(", ")
        )))
    }
}

impl ReturnValueResolver for NegotiatingResolver {
    fn resolve(
        &self,
        value: ReturnValue,
        request: &Request,
        _response: &Response,
    ) -> Result<ResolvedBody, WebError> {
        match self_describing(value) {
            Ok(body) => Ok(body),
            Err((ty, value)) => write_entity(self.negotiate(&ty, request)?, &ty, &value),
        }
    }
}

/// Writes entities with the serializer pinned on the handler method.
///
/// Binding fails when the pinned serializer is not registered. At request
/// time, a format override the serializer cannot produce is an
/// [`WebError::UnsupportedOperation`]; `Accept` is not consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSerializerResolverFactory;

impl ReturnValueResolverFactory for FixedSerializerResolverFactory {
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.serializer().is_some()
    }

    fn create_resolver(
        &self,
        method: &HandlerMethod,
        ctx: &ResolverContext,
    ) -> Result<Box<dyn ReturnValueResolver>, BindError> {
        let name = method.serializer().unwrap_or_default();
        let serializer = ctx
            .serializers()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| BindError::MissingSerializer {
                method: method.to_string(),
                serializer: name.to_owned(),
            })?;
        Ok(Box::new(FixedSerializerResolver {
            serializer,
            format_parameter: ctx.format_parameter().map(str::to_owned),
        }))
    }
}

struct FixedSerializerResolver {
    serializer: Arc<dyn HttpBodySerializer>,
    format_parameter: Option<String>,
}

impl ReturnValueResolver for FixedSerializerResolver {
    fn resolve(
        &self,
        value: ReturnValue,
        request: &Request,
        _response: &Response,
    ) -> Result<ResolvedBody, WebError> {
        let (ty, value) = match self_describing(value) {
            Ok(body) => return Ok(body),
            Err(entity) => entity,
        };

        let media_type = match requested_format(self.format_parameter.as_deref(), request) {
            Some(format) => MediaType::for_format(format).ok_or_else(|| {
                WebError::UnsupportedOperation(format!("unknown format '{format}'"))
            })?,
            None => self.serializer.media_type(),
        };
        if !self.serializer.supports_write(&media_type, &ty) {
            return Err(WebError::UnsupportedOperation(format!(
                "serializer '{}' cannot write {} as '{}'",
                self.serializer.name(),
                ty.simple_name(),
                media_type.essence()
            )));
        }
        write_entity(self.serializer.as_ref(), &ty, &value)
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::handler::{Args, InvokeError};
    use crate::http::{Method, StatusCode};
    use crate::serialize::{HIGHEST_PRECEDENCE, JsonSerializer, SerializeError};

    #[derive(Serialize)]
    struct Pojo {
        id: u32,
        message: &'static str,
    }

    /// Claims protobuf but only writes types named `*Message`.
    struct ProtoLike;

    impl HttpBodySerializer for ProtoLike {
        fn name(&self) -> &str {
            "protobuf"
        }
        fn media_type(&self) -> MediaType {
            MediaType::application_protobuf()
        }
        fn order(&self) -> i32 {
            HIGHEST_PRECEDENCE
        }
        fn supports_read(&self, _: &MediaType, _: &EntityType) -> bool {
            false
        }
        fn supports_write(&self, media_type: &MediaType, ty: &EntityType) -> bool {
            media_type.is_compatible_with(&MediaType::application_protobuf())
                && ty.simple_name().ends_with("Message")
        }
        fn serialize(&self, _: &serde_json::Value, _: &EntityType) -> Result<Bytes, SerializeError> {
            Ok(Bytes::from_static(b"\x08\x01"))
        }
        fn deserialize(&self, _: &[u8], _: &EntityType) -> Result<serde_json::Value, SerializeError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn ctx() -> ResolverContext {
        ResolverContext::new(
            vec![Arc::new(ProtoLike), Arc::new(JsonSerializer)],
            Some("format".to_owned()),
        )
    }

    async fn noop(_args: Args) -> Result<ReturnValue, InvokeError> {
        Ok(ReturnValue::Void)
    }

    fn pojo() -> ReturnValue {
        ReturnValue::entity(&Pojo { id: 1024, message: "foo" }).unwrap()
    }

    fn negotiate(uri: &str, accept: Option<&str>, value: ReturnValue) -> Result<ResolvedBody, WebError> {
        let mut builder = Request::builder(Method::Get, uri);
        if let Some(accept) = accept {
            builder = builder.header("Accept", accept);
        }
        let method = HandlerMethod::new("C", "m", noop);
        NegotiatingResolverFactory
            .create_resolver(&method, &ctx())
            .unwrap()
            .resolve(value, &builder.build(), &Response::new())
    }

    #[test]
    fn entity_bytes_match_direct_encoding() {
        let expected = serde_json::to_vec(&Pojo { id: 1024, message: "foo" }).unwrap();
        for uri in ["/", "/?format=json"] {
            let ResolvedBody::Payload { bytes, content_type } = negotiate(uri, None, pojo()).unwrap() else {
                panic!("expected a payload");
            };
            assert_eq!(bytes.as_ref(), expected.as_slice());
            assert_eq!(content_type, MediaType::application_json());
        }
    }

    #[test]
    fn pb_format_for_plain_entity_is_unsupported() {
        let err = negotiate("/?format=pb", None, pojo()).unwrap_err();
        assert!(matches!(err, WebError::UnsupportedOperation(_)));
        assert_eq!(err.status(), StatusCode::InternalServerError);
    }

    #[test]
    fn unacceptable_accept_is_406() {
        let err = negotiate("/", Some("application/xml"), pojo()).unwrap_err();
        assert_eq!(err.status(), StatusCode::NotAcceptable);
    }

    #[test]
    fn self_describing_values_skip_serializers() {
        let body = negotiate("/?format=pb", None, ReturnValue::scalar(1)).unwrap();
        assert_eq!(
            body,
            ResolvedBody::Payload {
                content_type: MediaType::text_plain().with_param("charset", "utf-8"),
                bytes: Bytes::from_static(b"1"),
            }
        );
        assert_eq!(negotiate("/", None, ReturnValue::Written).unwrap(), ResolvedBody::AlreadyWritten);
        assert_eq!(negotiate("/", None, ReturnValue::Void).unwrap(), ResolvedBody::Empty);
    }

    #[test]
    fn pinned_serializer() {
        let method = HandlerMethod::new("C", "m", noop).response_serializer("json");
        assert!(FixedSerializerResolverFactory.supports(&method));
        assert!(!NegotiatingResolverFactory.supports(&method));
        let resolver = FixedSerializerResolverFactory
            .create_resolver(&method, &ctx())
            .unwrap();

        // Accept is ignored.
        let request = Request::builder(Method::Get, "/").header("Accept", "text/html").build();
        assert!(matches!(
            resolver.resolve(pojo(), &request, &Response::new()).unwrap(),
            ResolvedBody::Payload { .. }
        ));

        let request = Request::builder(Method::Get, "/?format=pb").build();
        let err = resolver.resolve(pojo(), &request, &Response::new()).unwrap_err();
        assert!(matches!(err, WebError::UnsupportedOperation(_)));
    }

    #[test]
    fn pinned_serializer_must_exist() {
        let method = HandlerMethod::new("C", "m", noop).response_serializer("xml");
        assert!(matches!(
            FixedSerializerResolverFactory.create_resolver(&method, &ctx()),
            Err(BindError::MissingSerializer { .. })
        ));
    }
}
