//! Partition keys.

use std::fmt;

/// What a partition holds.
///
/// The kind is part of the key's structure, so a snapshot partition and an
/// operation partition of the same collection can never alias each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKind {
    /// Encoded snapshots, one item per document id.
    Snapshots,
    /// The operation log of one document, one item per version.
    Operations {
        /// Document the log belongs to.
        doc: String,
    },
    /// Operations of a collection keyed by operation identifier.
    OperationIndex,
}

impl PartitionKind {
    /// Short marker used when the kind has to be spelled out.
    pub fn marker(&self) -> &'static str {
        match self {
            PartitionKind::Snapshots => "s",
            PartitionKind::Operations { .. } => "o",
            PartitionKind::OperationIndex => "i",
        }
    }
}

/// Address of a partition in a [`crate::KeyValueStore`].
///
/// Composed of a store-wide prefix, a collection name and a
/// [`PartitionKind`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    prefix: String,
    collection: String,
    kind: PartitionKind,
}

impl PartitionKey {
    /// Creates a partition key.
    pub fn new(prefix: impl Into<String>, collection: impl Into<String>, kind: PartitionKind) -> Self {
        Self {
            prefix: prefix.into(),
            collection: collection.into(),
            kind,
        }
    }

    /// Key of the snapshot partition of a collection.
    pub fn snapshots(prefix: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::new(prefix, collection, PartitionKind::Snapshots)
    }

    /// Key of the operation log partition of one document.
    pub fn operations(
        prefix: impl Into<String>,
        collection: impl Into<String>,
        doc: impl Into<String>,
    ) -> Self {
        Self::new(prefix, collection, PartitionKind::Operations { doc: doc.into() })
    }

    /// Key of the operation-identifier index of a collection.
    pub fn operation_index(prefix: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::new(prefix, collection, PartitionKind::OperationIndex)
    }

    /// Returns the store-wide prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the partition kind.
    pub fn kind(&self) -> &PartitionKind {
        &self.kind
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PartitionKind::Operations { doc } => write!(
                f,
                "{}/{}/{}/{}",
                self.prefix,
                self.collection,
                self.kind.marker(),
                doc
            ),
            kind => write!(f, "{}/{}/{}", self.prefix, self.collection, kind.marker()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_never_alias() {
        let snaps = PartitionKey::snapshots("p", "docs");
        let ops = PartitionKey::operations("p", "docs", "a");
        let index = PartitionKey::operation_index("p", "docs");

        assert_ne!(snaps, ops);
        assert_ne!(snaps, index);
        assert_ne!(ops, index);
    }

    #[test]
    fn separator_in_names_does_not_alias() {
        let a = PartitionKey::snapshots("p/x", "docs");
        let b = PartitionKey::snapshots("p", "x/docs");
        assert_ne!(a, b);
    }

    #[test]
    fn display() {
        assert_eq!(PartitionKey::snapshots("p", "docs").to_string(), "p/docs/s");
        assert_eq!(
            PartitionKey::operations("p", "docs", "a").to_string(),
            "p/docs/o/a"
        );
    }
}
