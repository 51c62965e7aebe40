//! CBOR byte framing for values stored in the key-value backend.

use crate::error::{CodecError, CodecResult};
use crate::record::Record;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serializes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encoding`] if the value cannot be serialized.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| CodecError::encoding(e.to_string()))?;
    Ok(out)
}

/// Deserializes a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decoding`] if the bytes are not valid CBOR for `T`.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding(e.to_string()))
}

/// Serializes a storage record.
///
/// # Errors
///
/// Returns [`CodecError::Encoding`] if serialization fails.
pub fn record_to_bytes(record: &Record) -> CodecResult<Vec<u8>> {
    to_bytes(record)
}

/// Deserializes a storage record, checking that it is a mapping.
///
/// # Errors
///
/// Returns [`CodecError::Decoding`] for invalid CBOR and
/// [`CodecError::InvalidRecord`] if the top-level value is not a mapping.
pub fn record_from_bytes(bytes: &[u8]) -> CodecResult<Record> {
    match from_bytes::<Value>(bytes)? {
        Value::Object(record) => Ok(record),
        other => Err(CodecError::invalid_record(format!(
            "expected a mapping at the top level, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OpId, Operation};
    use serde_json::json;

    #[test]
    fn record_bytes_roundtrip() {
        let record = json!({"_id": "a", "_v": 3, "score": 1.5, "tags": ["x", "y"], "n": null});
        let record = record.as_object().unwrap().clone();

        let bytes = record_to_bytes(&record).unwrap();
        assert_eq!(record_from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn negative_and_large_integers_survive() {
        let record = json!({"neg": -42, "big": u64::MAX});
        let record = record.as_object().unwrap().clone();
        let decoded = record_from_bytes(&record_to_bytes(&record).unwrap()).unwrap();
        assert_eq!(decoded["neg"], json!(-42));
        assert_eq!(decoded["big"], json!(u64::MAX));
    }

    #[test]
    fn operation_bytes_roundtrip() {
        let mut op = Operation::new(4, json!({"op": [{"p": ["a"], "oi": 1}]}));
        op.id = Some(OpId::new());
        op.doc = Some("a".into());

        let decoded: Operation = from_bytes(&to_bytes(&op).unwrap()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn non_mapping_record_rejected() {
        let bytes = to_bytes(&json!([1, 2, 3])).unwrap();
        assert!(matches!(
            record_from_bytes(&bytes),
            Err(CodecError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            record_from_bytes(&[0xff, 0x00, 0x13]),
            Err(CodecError::Decoding { .. })
        ));
    }
}
