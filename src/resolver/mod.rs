//! Argument and return value resolver chains.
//!
//! A [`ResolverRegistry`] holds ordered resolver factories, advices and body
//! serializers. Handler methods bind against it once; the bound resolvers
//! then run on every request.

mod argument;
mod bean;
mod body;
mod injected;
mod multipart;
mod name_value;
mod result;
mod sources;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

pub use argument::{ArgumentResolver, ArgumentResolverAdvice, ArgumentResolverFactory};
pub use body::RequestBodyResolverFactory;
pub use injected::InjectedResolverFactory;
pub use multipart::MultipartFileResolverFactory;
pub use name_value::{Fallback, NameAndValue};
pub use result::{
    FixedSerializerResolverFactory, NegotiatingResolverFactory, ResolvedBody,
    ReturnValueResolver, ReturnValueResolverAdvice, ReturnValueResolverFactory,
};
pub use sources::NameValueResolverFactory;

use crate::error::BindError;
use crate::handler::{BeanType, HandlerMethod, Param, ParamType};
use crate::serialize::{HttpBodySerializer, JsonSerializer};
use argument::AdvisedArgumentResolver;
use bean::BeanResolver;
use result::AdvisedReturnValueResolver;

/// What factories see while building resolvers.
#[derive(Clone, Default)]
pub struct ResolverContext {
    serializers: Vec<Arc<dyn HttpBodySerializer>>,
    format_parameter: Option<String>,
}

impl ResolverContext {
    pub fn new(
        serializers: Vec<Arc<dyn HttpBodySerializer>>,
        format_parameter: Option<String>,
    ) -> Self {
        Self {
            serializers,
            format_parameter,
        }
    }

    /// Registered serializers, highest precedence first.
    pub fn serializers(&self) -> &[Arc<dyn HttpBodySerializer>] {
        &self.serializers
    }

    /// Query parameter that overrides content negotiation, if enabled.
    pub fn format_parameter(&self) -> Option<&str> {
        self.format_parameter.as_deref()
    }
}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.serializers.iter().map(|s| s.name()).collect();
        f.debug_struct("ResolverContext")
            .field("serializers", &names)
            .field("format_parameter", &self.format_parameter)
            .finish()
    }
}

/// Ordered resolver factories and advices.
pub struct ResolverRegistry {
    arguments: Vec<Box<dyn ArgumentResolverFactory>>,
    argument_advices: Vec<Arc<dyn ArgumentResolverAdvice>>,
    returns: Vec<Box<dyn ReturnValueResolverFactory>>,
    return_advices: Vec<Arc<dyn ReturnValueResolverAdvice>>,
    ctx: ResolverContext,
}

impl ResolverRegistry {
    pub fn builder() -> ResolverRegistryBuilder {
        ResolverRegistryBuilder::default()
    }

    /// The built-in resolvers with the JSON serializer.
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    pub fn context(&self) -> &ResolverContext {
        &self.ctx
    }

    /// Builds the resolver for one parameter using the first supporting
    /// factory, wrapped with every advice that applies.
    pub fn bind_argument(
        &self,
        method: &HandlerMethod,
        param: &Param,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        let inner = match param.ty() {
            ParamType::Bean(bean) => self.bind_bean(method, *bean)?,
            _ => self
                .arguments
                .iter()
                .find(|f| f.supports(param))
                .ok_or_else(|| BindError::NoArgumentResolver {
                    method: method.to_string(),
                    index: param.index(),
                    name: param.name().to_owned(),
                })?
                .create_resolver(param, &self.ctx)?,
        };

        let advices: Vec<_> = self
            .argument_advices
            .iter()
            .filter(|a| a.supports(param))
            .cloned()
            .collect();
        trace!(%method, param = param.name(), advices = advices.len(), "argument resolver bound");
        if advices.is_empty() {
            return Ok(inner);
        }
        Ok(Box::new(AdvisedArgumentResolver { inner, advices }))
    }

    /// Every field binds through the same chain as a handler parameter.
    fn bind_bean(
        &self,
        method: &HandlerMethod,
        ty: BeanType,
    ) -> Result<Box<dyn ArgumentResolver>, BindError> {
        let fields = ty
            .fields()
            .iter()
            .map(|field| self.bind_argument(method, field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(BeanResolver { ty, fields }))
    }

    /// Builds the return value resolver for a method.
    pub fn bind_return(
        &self,
        method: &HandlerMethod,
    ) -> Result<Box<dyn ReturnValueResolver>, BindError> {
        let factory = self
            .returns
            .iter()
            .find(|f| f.supports(method))
            .ok_or_else(|| BindError::NoReturnValueResolver {
                method: method.to_string(),
            })?;
        let inner = factory.create_resolver(method, &self.ctx)?;

        let advices: Vec<_> = self
            .return_advices
            .iter()
            .filter(|a| a.supports(method))
            .cloned()
            .collect();
        if advices.is_empty() {
            return Ok(inner);
        }
        Ok(Box::new(AdvisedReturnValueResolver { inner, advices }))
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("argument_factories", &self.arguments.len())
            .field("argument_advices", &self.argument_advices.len())
            .field("return_factories", &self.returns.len())
            .field("return_advices", &self.return_advices.len())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Collects resolvers; [`build`](Self::build) sorts each list by order,
/// keeping registration order among equals.
pub struct ResolverRegistryBuilder {
    arguments: Vec<Box<dyn ArgumentResolverFactory>>,
    argument_advices: Vec<Arc<dyn ArgumentResolverAdvice>>,
    returns: Vec<Box<dyn ReturnValueResolverFactory>>,
    return_advices: Vec<Arc<dyn ReturnValueResolverAdvice>>,
    serializers: Vec<Arc<dyn HttpBodySerializer>>,
    format_parameter: Option<String>,
}

impl Default for ResolverRegistryBuilder {
    fn default() -> Self {
        Self {
            arguments: Vec::new(),
            argument_advices: Vec::new(),
            returns: Vec::new(),
            return_advices: Vec::new(),
            serializers: Vec::new(),
            format_parameter: Some("format".to_owned()),
        }
    }
}

impl ResolverRegistryBuilder {
    /// Registers the built-in factories and the JSON serializer.
    pub fn with_defaults(self) -> Self {
        self.argument_resolver(InjectedResolverFactory)
            .argument_resolver(NameValueResolverFactory::path())
            .argument_resolver(NameValueResolverFactory::query())
            .argument_resolver(NameValueResolverFactory::header())
            .argument_resolver(NameValueResolverFactory::cookie())
            .argument_resolver(MultipartFileResolverFactory)
            .argument_resolver(NameValueResolverFactory::form())
            .argument_resolver(RequestBodyResolverFactory)
            .return_value_resolver(FixedSerializerResolverFactory)
            .return_value_resolver(NegotiatingResolverFactory)
            .serializer(JsonSerializer)
    }

    pub fn argument_resolver(mut self, factory: impl ArgumentResolverFactory) -> Self {
        self.arguments.push(Box::new(factory));
        self
    }

    pub fn argument_advice(mut self, advice: impl ArgumentResolverAdvice) -> Self {
        self.argument_advices.push(Arc::new(advice));
        self
    }

    pub fn return_value_resolver(mut self, factory: impl ReturnValueResolverFactory) -> Self {
        self.returns.push(Box::new(factory));
        self
    }

    pub fn return_value_advice(mut self, advice: impl ReturnValueResolverAdvice) -> Self {
        self.return_advices.push(Arc::new(advice));
        self
    }

    pub fn serializer(mut self, serializer: impl HttpBodySerializer) -> Self {
        self.serializers.push(Arc::new(serializer));
        self
    }

    /// Query parameter that overrides negotiation; `None` disables it.
    pub fn format_parameter(mut self, name: Option<String>) -> Self {
        self.format_parameter = name;
        self
    }

    pub fn build(self) -> ResolverRegistry {
        let Self {
            mut arguments,
            mut argument_advices,
            mut returns,
            mut return_advices,
            mut serializers,
            format_parameter,
        } = self;
        arguments.sort_by_key(|f| f.order());
        argument_advices.sort_by_key(|a| a.order());
        returns.sort_by_key(|f| f.order());
        return_advices.sort_by_key(|a| a.order());
        serializers.sort_by_key(|s| s.order());

        ResolverRegistry {
            arguments,
            argument_advices,
            returns,
            return_advices,
            ctx: ResolverContext::new(serializers, format_parameter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WebError;
    use crate::handler::{ArgValue, Args, InvokeError, ParamType, ReturnValue};
    use crate::http::{Request, Response};
    use crate::serialize::{EntityType, HIGHEST_PRECEDENCE, SerializeError};
    use bytes::Bytes;

    async fn noop(_args: Args) -> Result<ReturnValue, InvokeError> {
        Ok(ReturnValue::Void)
    }

    struct Named(&'static str, i32);

    impl HttpBodySerializer for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn media_type(&self) -> crate::http::MediaType {
            crate::http::MediaType::application_xml()
        }
        fn order(&self) -> i32 {
            self.1
        }
        fn supports_read(&self, _: &crate::http::MediaType, _: &EntityType) -> bool {
            false
        }
        fn supports_write(&self, _: &crate::http::MediaType, _: &EntityType) -> bool {
            false
        }
        fn serialize(&self, _: &serde_json::Value, _: &EntityType) -> Result<Bytes, SerializeError> {
            Ok(Bytes::new())
        }
        fn deserialize(&self, _: &[u8], _: &EntityType) -> Result<serde_json::Value, SerializeError> {
            Ok(serde_json::Value::Null)
        }
    }

    struct Doubling;

    impl ArgumentResolverAdvice for Doubling {
        fn supports(&self, param: &Param) -> bool {
            param.name() == "n"
        }

        fn after_resolved(&self, value: ArgValue, _: &Request, _: &Response) -> Result<ArgValue, WebError> {
            Ok(ArgValue::of(value.get::<i32>().unwrap_or_default() * 2))
        }
    }

    #[test]
    fn serializers_sorted_by_precedence() {
        let registry = ResolverRegistry::builder()
            .with_defaults()
            .serializer(Named("late", 10))
            .serializer(Named("early", HIGHEST_PRECEDENCE))
            .build();
        let names: Vec<&str> = registry.context().serializers().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["early", "late", "json"]);
    }

    #[test]
    fn unsupported_param_fails_binding() {
        let registry = ResolverRegistry::builder().build();
        let method = HandlerMethod::new("C", "m", noop).param(Param::query("a", ParamType::of::<i32>()));
        let err = registry.bind_argument(&method, &method.params()[0]).err().unwrap();
        assert_eq!(
            err,
            BindError::NoArgumentResolver {
                method: "C#m".into(),
                index: 0,
                name: "a".into(),
            }
        );
        assert!(matches!(
            registry.bind_return(&method),
            Err(BindError::NoReturnValueResolver { .. })
        ));
    }

    #[test]
    fn advice_applies_only_where_supported() {
        let registry = ResolverRegistry::builder()
            .with_defaults()
            .argument_advice(Doubling)
            .build();
        let method = HandlerMethod::new("C", "m", noop)
            .param(Param::query("n", ParamType::of::<i32>()))
            .param(Param::query("m", ParamType::of::<i32>()));
        let request = Arc::new(Request::builder(crate::http::Method::Get, "/?n=4&m=4").build());
        let response = Response::new();

        let n = registry.bind_argument(&method, &method.params()[0]).unwrap();
        let m = registry.bind_argument(&method, &method.params()[1]).unwrap();
        assert_eq!(n.resolve(&request, &response).unwrap().get::<i32>(), Some(8));
        assert_eq!(m.resolve(&request, &response).unwrap().get::<i32>(), Some(4));
    }
}
