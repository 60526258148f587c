//! Base64 + JSON codec helpers for payment headers.
//!
//! `X-PAYMENT` and `X-Payment-Response` header values are base64-encoded
//! JSON documents. These helpers decode and encode them in one step.

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ProtocolError;

/// Decodes a base64 header value into a typed JSON document.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the input is not valid base64 or the
/// decoded bytes do not deserialize into `T`.
pub fn decode_base64_json<T: DeserializeOwned>(input: &[u8]) -> Result<T, ProtocolError> {
    let raw = b64.decode(input)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Encodes a value as JSON and wraps it in base64, suitable for a header.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the value fails to serialize.
pub fn encode_json_base64<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let raw = serde_json::to_vec(value)?;
    Ok(b64.encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x402::PaymentEnvelope;
    use serde_json::json;

    #[test]
    fn test_header_roundtrip() {
        let envelope = PaymentEnvelope {
            x402_version: 1,
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            payload: json!({"signature": "0xsig"}),
        };
        let header = encode_json_base64(&envelope).unwrap();
        let decoded: PaymentEnvelope = decode_base64_json(header.as_bytes()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let result: Result<PaymentEnvelope, _> = decode_base64_json(b"not-base64!!!");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let header = b64.encode(b"{\"unexpected\": true}");
        let result: Result<PaymentEnvelope, _> = decode_base64_json(header.as_bytes());
        assert!(result.is_err());
    }
}
