//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//! The parent's `@msgpack/msgpack` decoder expects struct-as-map format,
//! and `Part` variants are told apart by their map key.

use crate::error::Result;

/// MessagePack codec for structured data.
///
/// Uses `rmp_serde::to_vec_named` so structs are serialized as maps
/// (with field names) rather than arrays (positional).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        // CRITICAL: to_vec_named, NOT to_vec!
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EdgeStreamError;
    use crate::message::{ControlParameters, Part, Status, StatusCode};

    #[test]
    fn test_parameters_part_is_map_of_map() {
        let encoded = MsgPackCodec::encode(&Part::parameters(1, 2)).unwrap();

        // Outer fixmap with the variant key, inner fixmap with 2 fields.
        assert_eq!(encoded[0], 0x81, "Expected fixmap with 1 element");
        let inner = encoded
            .iter()
            .position(|&b| b == 0x82)
            .expect("inner struct should be a fixmap with 2 elements");
        assert!(inner > 1);
    }

    #[test]
    fn test_decode_parent_encoded_parameters() {
        // What the parent sends for {parameters: {minThreshold: 50, maxThreshold: 150}}
        let bytes = rmp_serde::to_vec_named(&serde_json::json!({
            "parameters": { "minThreshold": 50, "maxThreshold": 150 }
        }))
        .unwrap();

        let part: Part = MsgPackCodec::decode(&bytes).unwrap();
        assert_eq!(
            part,
            Part::ControlParameters(ControlParameters::new(50, 150))
        );
    }

    #[test]
    fn test_negative_thresholds_survive() {
        let encoded = MsgPackCodec::encode(&Part::parameters(-5, i32::MAX)).unwrap();
        let decoded: Part = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, Part::parameters(-5, i32::MAX));
    }

    #[test]
    fn test_status_is_map() {
        let status = Status::new(StatusCode::Internal, "boom");
        let encoded = MsgPackCodec::encode(&status).unwrap();
        assert_eq!(encoded[0], 0x82, "Expected fixmap with 2 elements");
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Part> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(EdgeStreamError::MsgPackDecode(_))));
    }
}
