//! The HTTP body serializer contract.
//!
//! Serializers translate between body bytes and [`serde_json::Value`], the
//! erased data model every entity passes through. Typed decoding into the
//! handler's declared type is carried by [`EntityType`].

use std::any::type_name;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::handler::ArgValue;
use crate::http::MediaType;

mod json;

pub use json::JsonSerializer;

/// Order value that sorts before everything else.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Order value that sorts after everything else.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Errors raised by serializers.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{serializer} cannot handle {type_name}")]
    Unsupported {
        serializer: String,
        type_name: String,
    },
}

type Decode = fn(serde_json::Value) -> Result<ArgValue, serde_json::Error>;

/// The declared type of an entity body or return value.
///
/// Types created with [`EntityType::of`] can also be decoded from the erased
/// model into a typed [`ArgValue`].
#[derive(Clone, Copy)]
pub struct EntityType {
    type_name: &'static str,
    decode: Option<Decode>,
}

impl EntityType {
    /// An entity type that can be read from request bodies.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            type_name: type_name::<T>(),
            decode: Some(decode_into::<T> as Decode),
        }
    }

    /// An entity type known by name only (return values).
    pub fn named<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>(),
            decode: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The last path segment of the type name, e.g. `Pojo`.
    pub fn simple_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn is_readable(&self) -> bool {
        self.decode.is_some()
    }

    /// Decodes an erased value into the declared type.
    ///
    /// # Errors
    ///
    /// Fails if the value does not fit the type, or the type was created with
    /// [`named`](Self::named).
    pub fn decode(&self, value: serde_json::Value) -> Result<ArgValue, SerializeError> {
        match self.decode {
            Some(decode) => Ok(decode(value)?),
            None => Err(SerializeError::Unsupported {
                serializer: "entity decoder".to_owned(),
                type_name: self.type_name.to_owned(),
            }),
        }
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityType").field(&self.type_name).finish()
    }
}

fn decode_into<T>(value: serde_json::Value) -> Result<ArgValue, serde_json::Error>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    serde_json::from_value::<T>(value).map(ArgValue::of)
}

/// Converts between HTTP bodies and the erased entity model.
///
/// Serializers are consulted in ascending [`order`](Self::order); the first
/// one that supports a media type and entity type wins.
pub trait HttpBodySerializer: Send + Sync + 'static {
    /// Unique name, used to pin a serializer to a handler method.
    fn name(&self) -> &str;

    /// The media type this serializer produces.
    fn media_type(&self) -> MediaType;

    fn order(&self) -> i32 {
        0
    }

    /// Can a body of `media_type` be read into `ty`?
    fn supports_read(&self, media_type: &MediaType, ty: &EntityType) -> bool;

    /// Can `ty` be written for a client accepting `media_type`?
    fn supports_write(&self, media_type: &MediaType, ty: &EntityType) -> bool;

    fn serialize(&self, value: &serde_json::Value, ty: &EntityType)
    -> Result<Bytes, SerializeError>;

    fn deserialize(&self, body: &[u8], ty: &EntityType)
    -> Result<serde_json::Value, SerializeError>;
}
