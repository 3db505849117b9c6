//! Values flowing into and out of handler methods.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::error::WebError;
use crate::http::{Request, Response};
use crate::serialize::EntityType;

/// A resolved argument: a type-erased value, or null.
///
/// Cloning is cheap; the value itself is shared.
#[derive(Clone)]
pub struct ArgValue {
    value: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl ArgValue {
    pub fn of<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            value: Some(Arc::new(value)),
            type_name: type_name::<T>(),
        }
    }

    pub fn null() -> Self {
        Self {
            value: None,
            type_name: "null",
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Runtime type name of the value (`"null"` for null).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }

    /// A clone of the value if it has type `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(_) => write!(f, "ArgValue({})", self.type_name),
            None => f.write_str("ArgValue(null)"),
        }
    }
}

/// Resolved arguments handed to a handler method, with typed extraction.
///
/// Extraction failures are reported as [`InvokeError::ArgumentMismatch`],
/// which the invoker turns into a 400 describing every resolved argument.
#[derive(Debug, Clone)]
pub struct Args {
    request: Arc<Request>,
    response: Response,
    values: Vec<ArgValue>,
}

impl Args {
    pub fn new(request: Arc<Request>, response: Response, values: Vec<ArgValue>) -> Self {
        Self {
            request,
            response,
            values,
        }
    }

    /// The argument at `index` as a `T`; null or a different type is a mismatch.
    pub fn get<T: Clone + 'static>(&self, index: usize) -> Result<T, InvokeError> {
        let value = self.value(index)?;
        value.get::<T>().ok_or_else(|| mismatch::<T>(index, value))
    }

    /// Like [`get`](Self::get), but null yields `None`.
    pub fn get_opt<T: Clone + 'static>(&self, index: usize) -> Result<Option<T>, InvokeError> {
        let value = self.value(index)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .get::<T>()
            .map(Some)
            .ok_or_else(|| mismatch::<T>(index, value))
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn value(&self, index: usize) -> Result<&ArgValue, InvokeError> {
        self.values.get(index).ok_or_else(|| {
            InvokeError::ArgumentMismatch(format!(
                "argument index {index} out of range ({} resolved)",
                self.values.len()
            ))
        })
    }
}

fn mismatch<T>(index: usize, found: &ArgValue) -> InvokeError {
    InvokeError::ArgumentMismatch(format!(
        "argument [{index}] expected {}, found {}",
        type_name::<T>(),
        found.type_name()
    ))
}

/// What a handler method returns.
///
/// Everything but [`Entity`](ReturnValue::Entity) is self-describing: its
/// bytes are defined without a serializer.
#[derive(Debug, Clone)]
pub enum ReturnValue {
    /// No body.
    Void,
    /// UTF-8 text, emitted as `text/plain`.
    Text(String),
    /// Raw bytes, emitted as `application/octet-stream`.
    Bytes(Bytes),
    /// A primitive rendered as its canonical text, e.g. `1` or `true`.
    Scalar(String),
    /// A structured value encoded by a negotiated or pinned serializer.
    Entity {
        ty: EntityType,
        value: serde_json::Value,
    },
    /// The handler wrote the body itself; nothing is emitted.
    Written,
}

impl ReturnValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn scalar(value: impl fmt::Display) -> Self {
        Self::Scalar(value.to_string())
    }

    /// Captures a serializable value for serializer-driven encoding.
    pub fn entity<T>(value: &T) -> Result<Self, InvokeError>
    where
        T: Serialize + 'static,
    {
        let json = serde_json::to_value(value).map_err(|e| {
            WebError::Internal(format!("failed to capture {}: {e}", type_name::<T>()))
        })?;
        Ok(Self::Entity {
            ty: EntityType::named::<T>(),
            value: json,
        })
    }

    pub fn is_self_describing(&self) -> bool {
        !matches!(self, Self::Entity { .. })
    }
}

/// Failure of a handler invocation.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The handler could not extract an argument of the requested type.
    #[error("{0}")]
    ArgumentMismatch(String),

    /// The handler itself failed.
    #[error(transparent)]
    Handler(#[from] WebError),
}
