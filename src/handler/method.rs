//! Descriptors of handler methods and their parameters.
//!
//! A [`HandlerMethod`] is built explicitly at startup: controller and method
//! names for diagnostics, the ordered parameter list the resolvers bind
//! against, an optional pinned serializer, and the strongly-typed function
//! that does the work.

use std::any::{TypeId, type_name};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::{ArgValue, Args, InvokeError, ReturnValue};
use crate::serialize::EntityType;

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The function behind a [`HandlerMethod`].
///
/// Any `Fn(Args) -> impl Future<Output = Result<ReturnValue, InvokeError>>`
/// that is `Send + Sync + 'static` implements this trait through the blanket
/// impl below.
pub trait MethodHandler: Send + Sync + 'static {
    /// Call the handler with resolved arguments, boxing the returned future.
    fn call(&self, args: Args) -> BoxFuture<'static, Result<ReturnValue, InvokeError>>;
}

impl<T, F> MethodHandler for T
where
    T: Fn(Args) -> F + Send + Sync + 'static,
    F: Future<Output = Result<ReturnValue, InvokeError>> + Send + 'static,
{
    fn call(&self, args: Args) -> BoxFuture<'static, Result<ReturnValue, InvokeError>> {
        Box::pin((self)(args))
    }
}

/// Normalized, read-only description of a handler method.
///
/// # Examples
///
/// ```
/// use restline::handler::{Args, HandlerMethod, InvokeError, Param, ParamType, ReturnValue};
///
/// async fn hello(args: Args) -> Result<ReturnValue, InvokeError> {
///     let name: String = args.get(0)?;
///     Ok(ReturnValue::text(format!("hello {name}")))
/// }
///
/// let method = HandlerMethod::new("Greeter", "hello", hello)
///     .param(Param::query("name", ParamType::of::<String>()).default_value("world"))
///     .returns::<String>();
///
/// assert_eq!(method.signature(), "hello(alloc::string::String) -> alloc::string::String");
/// assert_eq!(method.params()[0].index(), 0);
/// ```
#[derive(Clone)]
pub struct HandlerMethod {
    controller: String,
    name: String,
    params: Vec<Param>,
    return_type: &'static str,
    serializer: Option<String>,
    handler: Arc<dyn MethodHandler>,
}

impl HandlerMethod {
    pub fn new(
        controller: impl Into<String>,
        name: impl Into<String>,
        handler: impl MethodHandler,
    ) -> Self {
        Self {
            controller: controller.into(),
            name: name.into(),
            params: Vec::new(),
            return_type: "()",
            serializer: None,
            handler: Arc::new(handler),
        }
    }

    /// Appends a parameter; its index is its position.
    #[must_use]
    pub fn param(mut self, mut param: Param) -> Self {
        param.index = self.params.len();
        self.params.push(param);
        self
    }

    /// Declares the return type (diagnostics only).
    #[must_use]
    pub fn returns<T: ?Sized>(mut self) -> Self {
        self.return_type = type_name::<T>();
        self
    }

    /// Pins the serializer used for entity return values, skipping negotiation.
    #[must_use]
    pub fn response_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = Some(name.into());
        self
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn return_type(&self) -> &'static str {
        self.return_type
    }

    pub fn serializer(&self) -> Option<&str> {
        self.serializer.as_deref()
    }

    pub fn handler(&self) -> &Arc<dyn MethodHandler> {
        &self.handler
    }

    /// `name(T0, T1) -> R`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.type_name()).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.return_type)
    }
}

impl fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.controller, self.name)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("controller", &self.controller)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("serializer", &self.serializer)
            .finish()
    }
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Query,
    Header,
    Path,
    Cookie,
    /// URL-encoded or multipart form field.
    Form,
    Body,
    /// A multipart part: a file, or a text field.
    Part,
    /// Framework-provided: the request or response handle.
    Injected,
    /// A [`RequestBean`] assembled from its own fields.
    Bean,
}

/// A handler method parameter.
#[derive(Debug, Clone)]
pub struct Param {
    index: usize,
    name: String,
    ty: ParamType,
    source: ParamSource,
    required: bool,
    default_value: Option<String>,
}

impl Param {
    /// Optional-typed parameters start out not required; everything else is required.
    pub fn new(name: impl Into<String>, source: ParamSource, ty: ParamType) -> Self {
        Self {
            index: 0,
            name: name.into(),
            required: !matches!(ty, ParamType::Optional(_)),
            ty,
            source,
            default_value: None,
        }
    }

    pub fn query(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Query, ty)
    }

    pub fn header(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Header, ty)
    }

    pub fn path(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Path, ty)
    }

    pub fn cookie(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Cookie, ty)
    }

    pub fn form(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Form, ty)
    }

    pub fn part(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Part, ty)
    }

    pub fn body(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Body, ty)
    }

    /// A [`RequestBean`] whose fields are resolved one by one.
    pub fn bean<T: RequestBean>(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Bean, ParamType::Bean(BeanType::of::<T>()))
    }

    /// The request (`ParamType::Request`) or response (`ParamType::Response`).
    pub fn injected(ty: ParamType) -> Self {
        let name = match ty {
            ParamType::Response => "response",
            _ => "request",
        };
        Self::new(name, ParamSource::Injected, ty)
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Value used when the request carries none; converted once at binding.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    pub fn source(&self) -> ParamSource {
        self.source
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// The declared type of a parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamType {
    /// A single value parsed with `FromStr`.
    Scalar(Scalar),
    /// `Option<T>`: absent means `None`.
    Optional(Scalar),
    /// `Vec<T>`: every occurrence, comma-separated values split.
    List(Scalar),
    /// Raw `Bytes`.
    Bytes,
    /// A structured value read by a serializer.
    Entity(EntityType),
    /// One [`MultipartFile`](crate::http::MultipartFile).
    File,
    /// `Vec<MultipartFile>` in submission order.
    Files,
    /// `Arc<Request>`
    Request,
    /// [`Response`](crate::http::Response)
    Response,
    /// A [`RequestBean`].
    Bean(BeanType),
}

impl ParamType {
    pub fn of<T>() -> Self
    where
        T: FromStr + Default + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::Scalar(Scalar::of::<T>())
    }

    pub fn optional<T>() -> Self
    where
        T: FromStr + Default + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::Optional(Scalar::of::<T>())
    }

    pub fn list<T>() -> Self
    where
        T: FromStr + Default + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::List(Scalar::of::<T>())
    }

    pub fn entity<T>() -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self::Entity(EntityType::of::<T>())
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::Scalar(s) => s.type_name.to_owned(),
            Self::Optional(s) => format!("Option<{}>", s.type_name),
            Self::List(s) => format!("Vec<{}>", s.type_name),
            Self::Bytes => "Bytes".to_owned(),
            Self::Entity(e) => e.type_name().to_owned(),
            Self::File => "MultipartFile".to_owned(),
            Self::Files => "Vec<MultipartFile>".to_owned(),
            Self::Request => "Arc<Request>".to_owned(),
            Self::Response => "Response".to_owned(),
            Self::Bean(b) => b.type_name().to_owned(),
        }
    }

    /// Can values of this type be produced from request text?
    pub fn is_text_convertible(&self) -> bool {
        matches!(
            self,
            Self::Scalar(_) | Self::Optional(_) | Self::List(_) | Self::Bytes
        )
    }

    /// Is this the `String` scalar (or an option/list of it)?
    pub fn is_string(&self) -> bool {
        match self {
            Self::Scalar(s) | Self::Optional(s) | Self::List(s) => s.is_string(),
            _ => false,
        }
    }

    /// Converts raw request values; single-valued types use the first one.
    ///
    /// # Errors
    ///
    /// Returns a description of the conversion failure.
    pub fn convert(&self, values: &[String]) -> Result<ArgValue, String> {
        let first = || {
            values
                .first()
                .map(String::as_str)
                .ok_or_else(|| "no value to convert".to_owned())
        };
        match self {
            Self::Scalar(s) => (s.convert)(first()?),
            Self::Optional(s) => (s.convert_some)(first()?),
            Self::List(s) => (s.convert_list)(values),
            Self::Bytes => Ok(ArgValue::of(Bytes::copy_from_slice(first()?.as_bytes()))),
            Self::Entity(e) => {
                let value: serde_json::Value =
                    serde_json::from_str(first()?).map_err(|err| err.to_string())?;
                e.decode(value).map_err(|err| err.to_string())
            }
            other => Err(format!("{} cannot be converted from text", other.type_name())),
        }
    }

    /// The value used for an absent, non-required parameter.
    pub fn empty_value(&self) -> ArgValue {
        match self {
            Self::Scalar(s) => (s.zero)(),
            Self::Optional(s) => (s.none)(),
            Self::List(s) => (s.empty_list)(),
            Self::Bytes => ArgValue::of(Bytes::new()),
            Self::Files => ArgValue::of(Vec::<crate::http::MultipartFile>::new()),
            Self::Entity(_) | Self::File | Self::Request | Self::Response | Self::Bean(_) => {
                ArgValue::null()
            }
        }
    }
}

type Convert = fn(&str) -> Result<ArgValue, String>;
type ConvertList = fn(&[String]) -> Result<ArgValue, String>;
type Make = fn() -> ArgValue;

/// Text conversion for a `FromStr` type, captured as plain function pointers.
#[derive(Clone, Copy)]
pub struct Scalar {
    type_name: &'static str,
    type_id: TypeId,
    convert: Convert,
    convert_some: Convert,
    convert_list: ConvertList,
    zero: Make,
    none: Make,
    empty_list: Make,
}

impl Scalar {
    /// A scalar whose absent, optional value is `T::default()`.
    pub fn of<T>() -> Self
    where
        T: FromStr + Default + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self {
            zero: zero_of::<T> as Make,
            ..Self::parsed::<T>()
        }
    }

    /// A scalar without a zero value; absent and optional means null.
    pub fn parsed<T>() -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self {
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            convert: convert_one::<T> as Convert,
            convert_some: convert_some::<T> as Convert,
            convert_list: convert_list::<T> as ConvertList,
            zero: ArgValue::null as Make,
            none: none_of::<T> as Make,
            empty_list: empty_list_of::<T> as Make,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_string(&self) -> bool {
        self.type_id == TypeId::of::<String>()
    }

    pub fn convert(&self, raw: &str) -> Result<ArgValue, String> {
        (self.convert)(raw)
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scalar").field(&self.type_name).finish()
    }
}

fn parse<T>(raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| format!("cannot convert {raw:?} to {}: {e}", type_name::<T>()))
}

fn convert_one<T>(raw: &str) -> Result<ArgValue, String>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    parse::<T>(raw).map(ArgValue::of)
}

fn convert_some<T>(raw: &str) -> Result<ArgValue, String>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    parse::<T>(raw).map(|v| ArgValue::of(Some(v)))
}

fn convert_list<T>(values: &[String]) -> Result<ArgValue, String>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse::<T>)
        .collect::<Result<Vec<T>, String>>()
        .map(ArgValue::of)
}

/// A parameter aggregated from several request values, such as a struct
/// holding a query value plus the request handle.
///
/// Each field is resolved through the same resolver chain as a handler
/// parameter, then [`assemble`](Self::assemble) builds the value from them.
///
/// ```
/// use restline::handler::{Args, InvokeError, Param, ParamType, RequestBean};
///
/// #[derive(Clone)]
/// struct Paging {
///     page: u32,
///     size: u32,
/// }
///
/// impl RequestBean for Paging {
///     fn fields() -> Vec<Param> {
///         vec![
///             Param::query("page", ParamType::of::<u32>()).default_value("1"),
///             Param::query("size", ParamType::of::<u32>()).default_value("20"),
///         ]
///     }
///
///     fn assemble(fields: Args) -> Result<Self, InvokeError> {
///         Ok(Paging { page: fields.get(0)?, size: fields.get(1)? })
///     }
/// }
///
/// let param = Param::bean::<Paging>("paging");
/// assert!(matches!(param.ty(), ParamType::Bean(_)));
/// ```
pub trait RequestBean: Send + Sync + 'static {
    /// The fields, in the order `assemble` reads them.
    fn fields() -> Vec<Param>;

    fn assemble(fields: Args) -> Result<Self, InvokeError>
    where
        Self: Sized;
}

type Assemble = fn(Args) -> Result<ArgValue, InvokeError>;

/// Type-erased view of a [`RequestBean`].
#[derive(Clone, Copy)]
pub struct BeanType {
    type_name: &'static str,
    fields: fn() -> Vec<Param>,
    assemble: Assemble,
}

impl BeanType {
    pub fn of<T: RequestBean>() -> Self {
        Self {
            type_name: type_name::<T>(),
            fields: T::fields,
            assemble: assemble_erased::<T> as Assemble,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The declared fields, indexed by position.
    pub fn fields(&self) -> Vec<Param> {
        (self.fields)()
            .into_iter()
            .enumerate()
            .map(|(index, mut field)| {
                field.index = index;
                field
            })
            .collect()
    }

    /// Builds the bean from its resolved field values.
    ///
    /// # Errors
    ///
    /// Whatever the bean's `assemble` reports.
    pub fn assemble(&self, fields: Args) -> Result<ArgValue, InvokeError> {
        (self.assemble)(fields)
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BeanType").field(&self.type_name).finish()
    }
}

fn assemble_erased<T: RequestBean>(fields: Args) -> Result<ArgValue, InvokeError> {
    T::assemble(fields).map(ArgValue::of)
}

fn zero_of<T: Default + Send + Sync + 'static>() -> ArgValue {
    ArgValue::of(T::default())
}

fn none_of<T: Send + Sync + 'static>() -> ArgValue {
    ArgValue::of(None::<T>)
}

fn empty_list_of<T: Send + Sync + 'static>() -> ArgValue {
    ArgValue::of(Vec::<T>::new())
}
