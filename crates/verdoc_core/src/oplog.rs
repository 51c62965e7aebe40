//! Per-document operation log.
//!
//! Every appended operation is written to two places:
//!
//! - the document's operations partition, keyed by zero-padded version, so
//!   a lexical listing is version order and range reads are direct lookups
//! - the collection's operation index, keyed by [`OpId`], so the `prev`
//!   chain can be followed without knowing versions
//!
//! Neither index is derived from the other.

use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;
use verdoc_codec::{from_bytes, to_bytes, OpId, Operation};
use verdoc_storage::{KeyValueStore, PartitionKey, StorageError};

/// Item key of the operation producing `version`.
pub fn version_key(version: u64) -> String {
    format!("{version:020}")
}

/// Append-only operation storage.
#[derive(Clone)]
pub struct OperationLog {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl OperationLog {
    /// Creates an operation log over a backend.
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn operations(&self, collection: &str, id: &str) -> PartitionKey {
        PartitionKey::operations(self.prefix.as_str(), collection, id)
    }

    fn index(&self, collection: &str) -> PartitionKey {
        PartitionKey::operation_index(self.prefix.as_str(), collection)
    }

    /// Stores `operation` at its version's slot.
    ///
    /// Assigns a fresh [`OpId`], links it to `prev` and records the owning
    /// document. Returns the stored operation.
    pub async fn append(
        &self,
        collection: &str,
        id: &str,
        operation: &Operation,
        prev: Option<OpId>,
    ) -> CoreResult<Operation> {
        let mut stored = operation.clone();
        stored.id = Some(OpId::new());
        stored.prev = prev;
        stored.doc = Some(id.to_string());

        let bytes = to_bytes(&stored)?;
        self.store
            .set(&self.operations(collection, id), &version_key(stored.version), bytes.clone())
            .await?;
        if let Some(op_id) = stored.id {
            self.store
                .set(&self.index(collection), &op_id.to_string(), bytes)
                .await?;
        }

        debug!(collection, id, version = stored.version, "appended operation");
        Ok(stored)
    }

    /// Number of stored operations for a document, which is its version.
    pub async fn current_version(&self, collection: &str, id: &str) -> CoreResult<u64> {
        let keys = self.store.list_item_ids(&self.operations(collection, id)).await?;
        Ok(keys.len() as u64)
    }

    /// Operations with versions in `[from, to)`, in version order.
    ///
    /// `to = None` reads through the current version. Bounds past the end
    /// of the log are clamped.
    pub async fn read(
        &self,
        collection: &str,
        id: &str,
        from: u64,
        to: Option<u64>,
    ) -> CoreResult<Vec<Operation>> {
        let partition = self.operations(collection, id);
        let current = self.current_version(collection, id).await?;
        let start = from.max(1);
        let end = to.map_or(current + 1, |to| to.min(current + 1));

        let mut ops = Vec::new();
        for version in start..end {
            let bytes = self
                .store
                .get(&partition, &version_key(version))
                .await?
                .ok_or_else(|| {
                    CoreError::from(StorageError::corrupted(format!(
                        "operation log for {collection}/{id} has no version {version}"
                    )))
                })?;
            ops.push(from_bytes(&bytes)?);
        }
        Ok(ops)
    }

    /// Looks up an operation by identifier.
    pub async fn find(&self, collection: &str, op_id: &OpId) -> CoreResult<Option<Operation>> {
        match self.store.get(&self.index(collection), &op_id.to_string()).await? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Follows `prev` links from `head`, newest first.
    ///
    /// The walk stops at the first operation without a predecessor or
    /// whose predecessor is not in the index.
    pub async fn history(&self, collection: &str, head: Option<OpId>) -> CoreResult<Vec<Operation>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = head;
        while let Some(op_id) = next {
            if !seen.insert(op_id) {
                return Err(StorageError::corrupted(format!(
                    "operation chain in {collection} loops at {op_id}"
                ))
                .into());
            }
            let Some(op) = self.find(collection, &op_id).await? else {
                break;
            };
            next = op.prev;
            chain.push(op);
        }
        Ok(chain)
    }

    /// Ids of every document with an indexed operation in `collection`.
    ///
    /// Covers logs whose snapshot was never written.
    pub async fn documents(&self, collection: &str) -> CoreResult<BTreeSet<String>> {
        let index = self.index(collection);
        let mut docs = BTreeSet::new();
        for op_id in self.store.list_item_ids(&index).await? {
            let Some(bytes) = self.store.get(&index, &op_id).await? else {
                continue;
            };
            let op: Operation = from_bytes(&bytes)?;
            if let Some(doc) = op.doc {
                docs.insert(doc);
            }
        }
        Ok(docs)
    }

    /// Removes the log of one document.
    pub async fn drop_document(&self, collection: &str, id: &str) -> CoreResult<()> {
        self.store.delete_partition(&self.operations(collection, id)).await?;
        Ok(())
    }

    /// Removes the identifier index of a collection.
    pub async fn drop_index(&self, collection: &str) -> CoreResult<()> {
        self.store.delete_partition(&self.index(collection)).await?;
        Ok(())
    }
}
