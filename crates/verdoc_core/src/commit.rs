//! Optimistic-concurrency commits.

use crate::error::{CoreError, CoreResult};
use crate::oplog::OperationLog;
use crate::snapshots::SnapshotStore;
use serde_json::Value;
use tracing::{debug, warn};
use verdoc_codec::{encode_snapshot, Operation, Snapshot};

/// Applies commits against an operation log and a snapshot store.
///
/// A commit only goes through when the new snapshot's version is exactly
/// one past the document's current version. The check and the writes are
/// not locked together: two writers racing on one document can both pass
/// the check, so commits for a document must be serialized upstream.
pub struct CommitCoordinator<'a> {
    log: &'a OperationLog,
    snapshots: &'a SnapshotStore,
}

impl<'a> CommitCoordinator<'a> {
    /// Creates a coordinator over existing stores.
    pub fn new(log: &'a OperationLog, snapshots: &'a SnapshotStore) -> Self {
        Self { log, snapshots }
    }

    /// Commits `operation` and `snapshot` for one document.
    ///
    /// Returns `Ok(false)` without writing anything when the snapshot's
    /// version is not the next one. Otherwise appends the operation, writes
    /// the snapshot linked to it and returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidOperation`] if the operation's version differs
    ///   from the snapshot's, or the snapshot belongs to another document;
    ///   nothing is written
    /// - [`CoreError::Storage`] on backend failure. A failure writing the
    ///   snapshot after the operation was appended is surfaced as is.
    pub async fn commit(
        &self,
        collection: &str,
        id: &str,
        operation: &Operation,
        snapshot: &Snapshot,
    ) -> CoreResult<bool> {
        if !self.is_next_version(collection, id, snapshot).await? {
            return Ok(false);
        }
        self.apply(collection, id, operation, snapshot).await
    }

    /// Like [`CommitCoordinator::commit`], with the operation in wire form.
    ///
    /// The version check runs first, so a stale commit returns `Ok(false)`
    /// even when the operation would not parse.
    ///
    /// # Errors
    ///
    /// As [`CommitCoordinator::commit`], plus [`CoreError::Codec`] with a
    /// validation error when the operation has no numeric `v`.
    pub async fn commit_value(
        &self,
        collection: &str,
        id: &str,
        operation: Value,
        snapshot: &Snapshot,
    ) -> CoreResult<bool> {
        if !self.is_next_version(collection, id, snapshot).await? {
            return Ok(false);
        }
        let operation = Operation::from_value(operation).map_err(|e| {
            warn!(collection, id, error = %e, "rejected malformed operation");
            CoreError::from(e)
        })?;
        self.apply(collection, id, &operation, snapshot).await
    }

    async fn is_next_version(&self, collection: &str, id: &str, snapshot: &Snapshot) -> CoreResult<bool> {
        let current = self.log.current_version(collection, id).await?;
        if snapshot.version == current + 1 {
            return Ok(true);
        }
        warn!(
            collection,
            id,
            current,
            proposed = snapshot.version,
            "commit rejected: version mismatch"
        );
        Ok(false)
    }

    async fn apply(
        &self,
        collection: &str,
        id: &str,
        operation: &Operation,
        snapshot: &Snapshot,
    ) -> CoreResult<bool> {
        if operation.version != snapshot.version {
            warn!(collection, id, op_version = operation.version, "rejected operation");
            return Err(CoreError::invalid_operation(format!(
                "operation version {} does not match snapshot version {}",
                operation.version, snapshot.version
            )));
        }
        if !snapshot.id.is_empty() && snapshot.id != id {
            return Err(CoreError::invalid_operation(format!(
                "snapshot {} committed as {id}",
                snapshot.id
            )));
        }

        let prev = self.snapshots.get(collection, id).await?.op_link;
        let stored = self.log.append(collection, id, operation, prev).await?;
        let record = encode_snapshot(id, snapshot, stored.id.as_ref());
        self.snapshots.put(collection, id, &record).await?;

        debug!(collection, id, version = snapshot.version, "commit accepted");
        Ok(true)
    }
}
