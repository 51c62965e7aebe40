//! Committed operations.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Process-unique identifier of a committed operation.
///
/// Assigned by the operation log at append time and never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(Uuid);

impl OpId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({})", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OpId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One committed mutation of a document.
///
/// The payload is opaque to VerDoc; only the synchronization layer that
/// produced it knows how to apply it.
///
/// # Fields
///
/// - `version`: the version this operation produces, which is also its
///   1-based position in the document's log
/// - `id`: assigned on append
/// - `prev`: the operation that produced the previous version, if any
/// - `doc`: the owning document, set on append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Version produced by this operation.
    pub version: u64,
    /// Opaque mutation description.
    pub payload: Value,
    /// Identifier assigned by the operation log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OpId>,
    /// Identifier of the previous operation in the history chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<OpId>,
    /// Owning document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Operation {
    /// Creates an unsaved operation.
    pub fn new(version: u64, payload: Value) -> Self {
        Self {
            version,
            payload,
            id: None,
            prev: None,
            doc: None,
        }
    }

    /// Parses an operation from its wire form.
    ///
    /// The wire form is an object carrying the version under `v`; every
    /// other field becomes the payload.
    ///
    /// ```
    /// use serde_json::json;
    /// use verdoc_codec::Operation;
    ///
    /// let op = Operation::from_value(json!({"v": 3, "op": [{"p": ["x"], "na": 1}]})).unwrap();
    /// assert_eq!(op.version, 3);
    /// assert_eq!(op.payload, json!({"op": [{"p": ["x"], "na": 1}]}));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidOperation`] if the value is not an
    /// object or `v` is missing or not a non-negative integer.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(CodecError::invalid_operation("operation must be an object"));
        };
        let version = match fields.remove("v") {
            Some(v) => v.as_u64().ok_or_else(|| {
                CodecError::invalid_operation(format!(
                    "operation version must be a non-negative integer, got {v}"
                ))
            })?,
            None => return Err(CodecError::invalid_operation("operation has no version")),
        };
        Ok(Self::new(version, Value::Object(fields)))
    }

    /// Returns the wire form of this operation.
    ///
    /// Object payloads are flattened next to `v`; anything else is placed
    /// under `payload`.
    pub fn to_value(&self) -> Value {
        let mut fields = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".into(), other.clone());
                map
            }
        };
        fields.insert("v".into(), Value::from(self.version));
        Value::Object(fields)
    }
}
