//! Response augmentation: tags upstream JSON responses with the resolved payment type.

use serde_json::Value;

use crate::payment_type::PaymentType;

/// Name of the field added to upstream responses.
pub const PAYMENT_TYPE_FIELD: &str = "payment_type";

/// Inserts `payment_type` into a top-level JSON object.
///
/// Returns `None` when `body` is not a JSON object; such bodies are passed through as-is.
/// An existing `payment_type` field is overwritten in place.
pub fn augment(body: &[u8], payment_type: PaymentType) -> Option<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object_mut()?;
    object.insert(
        PAYMENT_TYPE_FIELD.to_string(),
        Value::String(payment_type.as_str().to_string()),
    );
    serde_json::to_vec(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_adds_payment_type() {
        let body = json!({ "payment_id": "pay-1", "status": "NEW" }).to_string();
        let augmented = augment(body.as_bytes(), PaymentType::P2m).unwrap();
        assert_eq!(
            parse(&augmented),
            json!({ "payment_id": "pay-1", "status": "NEW", "payment_type": "P2M" })
        );
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let body = json!({ "status": "OK" }).to_string();
        let once = augment(body.as_bytes(), PaymentType::Iban).unwrap();
        let twice = augment(&once, PaymentType::Iban).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reapplying_overwrites() {
        let body = json!({ "payment_type": "P2P", "status": "OK" }).to_string();
        let augmented = augment(body.as_bytes(), PaymentType::Tokenization).unwrap();
        assert_eq!(
            String::from_utf8(augmented).unwrap(),
            r#"{"payment_type":"TOKENIZATION","status":"OK"}"#
        );
    }

    #[test]
    fn test_non_object_passes_through() {
        assert_eq!(augment(b"[1,2,3]", PaymentType::P2p), None);
        assert_eq!(augment(b"\"ok\"", PaymentType::P2p), None);
        assert_eq!(augment(b"not json", PaymentType::P2p), None);
        assert_eq!(augment(b"", PaymentType::P2p), None);
    }
}
