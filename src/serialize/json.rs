use bytes::Bytes;

use super::{EntityType, HttpBodySerializer, LOWEST_PRECEDENCE, SerializeError};
use crate::http::MediaType;

/// JSON via `serde_json`; reads and writes any entity type.
///
/// Sorts last so that more specific serializers get the first chance.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const NAME: &'static str = "json";
}

impl HttpBodySerializer for JsonSerializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn media_type(&self) -> MediaType {
        MediaType::application_json()
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    fn supports_read(&self, media_type: &MediaType, _ty: &EntityType) -> bool {
        is_json(media_type)
    }

    fn supports_write(&self, media_type: &MediaType, _ty: &EntityType) -> bool {
        is_json(media_type)
    }

    fn serialize(
        &self,
        value: &serde_json::Value,
        _ty: &EntityType,
    ) -> Result<Bytes, SerializeError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(
        &self,
        body: &[u8],
        _ty: &EntityType,
    ) -> Result<serde_json::Value, SerializeError> {
        Ok(serde_json::from_slice(body)?)
    }
}

// `application/json`, ranges covering it, and `+json` structured suffixes.
fn is_json(media_type: &MediaType) -> bool {
    media_type.is_compatible_with(&MediaType::application_json())
        || (media_type.kind() == "application" && media_type.subtype().ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(s: &str) -> MediaType {
        s.parse().unwrap()
    }

    #[test]
    fn media_support() {
        let json = JsonSerializer;
        let ty = EntityType::named::<()>();
        assert!(json.supports_write(&mt("*/*"), &ty));
        assert!(json.supports_write(&mt("application/*"), &ty));
        assert!(json.supports_write(&mt("application/json;charset=utf-8"), &ty));
        assert!(json.supports_read(&mt("application/problem+json"), &ty));
        assert!(!json.supports_write(&mt("application/x-protobuf"), &ty));
        assert!(!json.supports_read(&mt("text/plain"), &ty));
    }

    #[test]
    fn bytes_match_direct_encoding() {
        let value = serde_json::json!({ "b": 1, "a": [true, null] });
        let bytes = JsonSerializer
            .serialize(&value, &EntityType::named::<()>())
            .unwrap();
        assert_eq!(bytes.as_ref(), serde_json::to_vec(&value).unwrap().as_slice());
    }

    #[test]
    fn malformed_body() {
        let err = JsonSerializer
            .deserialize(b"{", &EntityType::named::<()>())
            .unwrap_err();
        assert!(matches!(err, SerializeError::Json(_)));
    }
}
