//! Per-MIME-type request/response body marshalers.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::error::GatewayError;

/// Converts between a decoded value and wire bytes for one MIME type.
///
/// A gateway selects a marshaler by matching the incoming `Content-Type`
/// (to unmarshal the request body) and `Accept` (to marshal the response
/// body); [`super::GatewayConfig`] falls back to plain JSON when neither
/// header names a registered marshaler.
pub trait Marshaler: Send + Sync + std::fmt::Debug {
    fn marshal(&self, value: &Value) -> Result<Bytes, GatewayError>;
    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, GatewayError>;
}

/// Compact JSON, the gateway's default encoding.
#[derive(Debug, Default)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal(&self, value: &Value) -> Result<Bytes, GatewayError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| GatewayError::Marshal(e.to_string()))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Marshal(e.to_string()))
    }
}

/// Indented JSON for the `application/json+pretty` convenience MIME type.
///
/// Uses proto field names and numeric enum values, and omits unset optional
/// fields: `rpc-core`'s generated types already serialize that way, so the
/// only thing this marshaler adds over [`JsonMarshaler`] is
/// two-space indentation.
#[derive(Debug, Default)]
pub struct PrettyJsonMarshaler;

impl Marshaler for PrettyJsonMarshaler {
    fn marshal(&self, value: &Value) -> Result<Bytes, GatewayError> {
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(b"  "),
        );
        value
            .serialize(&mut serializer)
            .map_err(|e| GatewayError::Marshal(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Marshal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_marshaler_round_trips() {
        let marshaler = JsonMarshaler;
        let value = json!({"a": 1});
        let bytes = marshaler.marshal(&value).unwrap();
        assert_eq!(marshaler.unmarshal(&bytes).unwrap(), value);
    }

    #[test]
    fn pretty_marshaler_indents_output() {
        let marshaler = PrettyJsonMarshaler;
        let bytes = marshaler.marshal(&json!({"a": 1})).unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("  \"a\""));
    }
}
