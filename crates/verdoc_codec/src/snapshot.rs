//! Document snapshots.

use crate::operation::OpId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The state of one document at one version.
///
/// # Lifecycle
///
/// - version 0 with no type: the document was never created
/// - version N with a type: live
/// - version N without a type: tombstoned (soft-deleted); the version is
///   kept so a recreated document continues from N
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document id, unique within a collection.
    pub id: String,
    /// Number of operations applied to this document.
    pub version: u64,
    /// Data schema/handler; `None` for tombstones and uncreated documents.
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    /// Document payload; `None` when undefined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Side-channel metadata, never part of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Identifier of the operation that produced this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_link: Option<OpId>,
}

impl Snapshot {
    /// Creates a snapshot without metadata or operation link.
    pub fn new(
        id: impl Into<String>,
        version: u64,
        doc_type: Option<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            version,
            doc_type,
            data,
            metadata: None,
            op_link: None,
        }
    }

    /// The snapshot of a document that has never been created.
    pub fn absent(id: impl Into<String>) -> Self {
        Self::new(id, 0, None, None)
    }

    /// A tombstone at `version`.
    pub fn tombstone(id: impl Into<String>, version: u64) -> Self {
        Self::new(id, version, None, None)
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the operation link.
    #[must_use]
    pub fn with_op_link(mut self, op_link: OpId) -> Self {
        self.op_link = Some(op_link);
        self
    }

    /// Returns true if at least one operation was ever committed.
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Returns true if the document was created and later deleted.
    pub fn is_tombstone(&self) -> bool {
        self.exists() && self.doc_type.is_none()
    }

    /// Returns true if the document currently holds data.
    pub fn is_live(&self) -> bool {
        self.doc_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_snapshot() {
        let s = Snapshot::absent("a");
        assert_eq!(s.version, 0);
        assert!(!s.exists());
        assert!(!s.is_tombstone());
        assert!(!s.is_live());
    }

    #[test]
    fn tombstone_snapshot() {
        let s = Snapshot::tombstone("a", 4);
        assert!(s.exists());
        assert!(s.is_tombstone());
        assert_eq!(s.data, None);
    }

    #[test]
    fn serializes_type_field_name() {
        let s = Snapshot::new("a", 1, Some("text".into()), Some(json!("hi")));
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["type"], json!("text"));
        assert!(value.get("metadata").is_none());
    }
}
