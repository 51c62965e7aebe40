//! Database facade.

use crate::commit::CommitCoordinator;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::executor::{QueryExecutor, QueryOutput};
use crate::oplog::OperationLog;
use crate::snapshots::SnapshotStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use verdoc_codec::{OpId, Operation, Projection, Snapshot};
use verdoc_query::normalize;
use verdoc_storage::{InMemoryStore, KeyValueStore};

/// The main database handle.
///
/// `Database` is the entry point for the sync layer. It provides:
/// - Snapshot reads, single and bulk
/// - Optimistic-concurrency commits
/// - Operation log reads
/// - Mongo-style queries
/// - Collection management
///
/// All state lives in the injected [`KeyValueStore`]; two databases over
/// the same store and prefix see the same documents.
///
/// ```rust
/// use serde_json::json;
/// use verdoc_core::{Database, Operation, Snapshot};
///
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let db = Database::in_memory();
/// let snapshot = Snapshot::new("a", 1, Some("text".into()), Some(json!("hi")));
/// assert!(db.commit("docs", "a", &Operation::new(1, json!({})), &snapshot).await.unwrap());
///
/// let stored = db.get_snapshot("docs", "a").await.unwrap();
/// assert_eq!(stored.data, Some(json!("hi")));
/// # });
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Backend shared by every component.
    store: Arc<dyn KeyValueStore>,
    /// Snapshot records.
    snapshots: SnapshotStore,
    /// Operation log.
    log: OperationLog,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database over `store` with the default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, Config::default())
    }

    /// Opens a database over `store`.
    pub fn with_config(store: Arc<dyn KeyValueStore>, config: Config) -> Self {
        let prefix = config.key_prefix.clone();
        Self {
            snapshots: SnapshotStore::new(Arc::clone(&store), prefix.as_str()),
            log: OperationLog::new(Arc::clone(&store), prefix),
            store,
            config,
            is_open: RwLock::new(true),
        }
    }

    /// Opens a database over a fresh in-memory store.
    ///
    /// Data is lost when the database is dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads one document. Never-created documents come back at version 0.
    ///
    /// # Errors
    ///
    /// Fails on backend errors or an undecodable record.
    pub async fn get_snapshot(&self, collection: &str, id: &str) -> CoreResult<Snapshot> {
        self.ensure_open()?;
        self.snapshots.get(collection, id).await
    }

    /// Reads one document, keeping only the projected data fields.
    pub async fn get_snapshot_projected(
        &self,
        collection: &str,
        id: &str,
        projection: &Projection,
    ) -> CoreResult<Snapshot> {
        self.get_snapshot(collection, id).await.map(|s| projection.apply(s))
    }

    /// Reads many documents across collections.
    ///
    /// Documents that were never created are left out; tombstones are kept.
    pub async fn get_snapshots(
        &self,
        request: &HashMap<String, Vec<String>>,
    ) -> CoreResult<HashMap<String, HashMap<String, Snapshot>>> {
        self.ensure_open()?;
        let mut out = HashMap::with_capacity(request.len());
        for (collection, ids) in request {
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                let snapshot = self.snapshots.get(collection, id).await?;
                if snapshot.exists() {
                    found.insert(id.clone(), snapshot);
                }
            }
            out.insert(collection.clone(), found);
        }
        Ok(out)
    }

    /// Commits an operation and the snapshot it produces.
    ///
    /// Returns `Ok(false)` if `snapshot.version` is not the document's
    /// current version plus one; nothing is written in that case and the
    /// caller is expected to rebase and retry.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidOperation`] if the operation does not fit the
    ///   snapshot
    /// - [`CoreError::Storage`] on backend failure
    pub async fn commit(
        &self,
        collection: &str,
        id: &str,
        operation: &Operation,
        snapshot: &Snapshot,
    ) -> CoreResult<bool> {
        self.ensure_open()?;
        CommitCoordinator::new(&self.log, &self.snapshots)
            .commit(collection, id, operation, snapshot)
            .await
    }

    /// Commits an operation given in wire form (`{"v": n, ...}`).
    ///
    /// # Errors
    ///
    /// As [`Database::commit`], plus a validation error when `v` is missing
    /// or not numeric.
    pub async fn commit_value(
        &self,
        collection: &str,
        id: &str,
        operation: Value,
        snapshot: &Snapshot,
    ) -> CoreResult<bool> {
        self.ensure_open()?;
        CommitCoordinator::new(&self.log, &self.snapshots)
            .commit_value(collection, id, operation, snapshot)
            .await
    }

    /// Current version of a document, from its operation log.
    pub async fn current_version(&self, collection: &str, id: &str) -> CoreResult<u64> {
        self.ensure_open()?;
        self.log.current_version(collection, id).await
    }

    /// Operations producing versions in `[from, to)`; `to = None` reads
    /// through the current version.
    pub async fn get_operations(
        &self,
        collection: &str,
        id: &str,
        from: u64,
        to: Option<u64>,
    ) -> CoreResult<Vec<Operation>> {
        self.ensure_open()?;
        self.log.read(collection, id, from, to).await
    }

    /// Looks up one operation by identifier.
    pub async fn get_operation(&self, collection: &str, op_id: &OpId) -> CoreResult<Option<Operation>> {
        self.ensure_open()?;
        self.log.find(collection, op_id).await
    }

    /// Walks the operation chain of a document, newest first.
    pub async fn operation_history(&self, collection: &str, id: &str) -> CoreResult<Vec<Operation>> {
        self.ensure_open()?;
        let head = self.snapshots.get(collection, id).await?.op_link;
        self.log.history(collection, head).await
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// [`CoreError::Query`] for malformed or disallowed queries, before
    /// any record is read.
    pub async fn query(&self, collection: &str, query: &Value) -> CoreResult<QueryOutput> {
        self.run_query(collection, query, None).await
    }

    /// Runs a query, keeping only the projected data fields of each result.
    pub async fn query_projected(
        &self,
        collection: &str,
        query: &Value,
        projection: &Projection,
    ) -> CoreResult<QueryOutput> {
        self.run_query(collection, query, Some(projection)).await
    }

    async fn run_query(
        &self,
        collection: &str,
        query: &Value,
        projection: Option<&Projection>,
    ) -> CoreResult<QueryOutput> {
        self.ensure_open()?;
        let normalized = normalize(query)?;
        QueryExecutor::new(&self.snapshots, &self.config)
            .execute(collection, &normalized, projection)
            .await
    }

    /// Returns the document if it matches the query's filter.
    pub async fn query_doc(&self, collection: &str, id: &str, query: &Value) -> CoreResult<Option<Snapshot>> {
        self.ensure_open()?;
        let normalized = normalize(query)?;
        QueryExecutor::new(&self.snapshots, &self.config)
            .matches_document(collection, id, &normalized)
            .await
    }

    /// Returns true if a query cannot be evaluated one document at a time.
    ///
    /// # Errors
    ///
    /// [`CoreError::Query`] if the query does not normalize.
    pub fn needs_poll_mode(query: &Value) -> CoreResult<bool> {
        Ok(normalize(query)?.needs_poll_mode())
    }

    /// Removes every document and operation of a collection.
    ///
    /// Logs are found through both the snapshot partition and the operation
    /// index, so a log left behind by a failed snapshot write is dropped too.
    /// A log whose index entry was never written is not.
    pub async fn drop_collection(&self, collection: &str) -> CoreResult<()> {
        self.ensure_open()?;
        let mut ids = self.log.documents(collection).await?;
        ids.extend(self.snapshots.ids(collection).await?);
        for id in &ids {
            self.log.drop_document(collection, id).await?;
        }
        self.log.drop_index(collection).await?;
        self.snapshots.drop_collection(collection).await?;
        info!(collection, documents = ids.len(), "dropped collection");
        Ok(())
    }

    /// Removes everything from the backend, including data under other
    /// prefixes.
    pub async fn drop_all(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.store.clear().await?;
        info!("dropped all collections");
        Ok(())
    }

    /// Closes the database. Every later call fails with
    /// [`CoreError::DatabaseClosed`].
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyClosed`] if the database was already closed.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Err(CoreError::AlreadyClosed);
        }
        *is_open = false;
        info!("database closed");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live(id: &str, version: u64, data: Value) -> Snapshot {
        Snapshot::new(id, version, Some("json".into()), Some(data))
    }

    #[tokio::test]
    async fn close_twice_fails() {
        let db = Database::in_memory();
        assert!(db.is_open());
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.close(), Err(CoreError::AlreadyClosed)));
        assert!(matches!(
            db.get_snapshot("docs", "a").await,
            Err(CoreError::DatabaseClosed)
        ));
        assert!(matches!(db.query("docs", &json!({})).await, Err(CoreError::DatabaseClosed)));
    }

    #[tokio::test]
    async fn bulk_get_omits_uncreated() {
        let db = Database::in_memory();
        db.commit("docs", "a", &Operation::new(1, json!({})), &live("a", 1, json!({"x": 1})))
            .await
            .unwrap();
        db.commit("notes", "n", &Operation::new(1, json!({})), &live("n", 1, json!({})))
            .await
            .unwrap();

        let request = HashMap::from([
            ("docs".to_string(), vec!["a".to_string(), "missing".to_string()]),
            ("notes".to_string(), vec!["n".to_string()]),
        ]);
        let out = db.get_snapshots(&request).await.unwrap();
        assert_eq!(out["docs"].len(), 1);
        assert_eq!(out["docs"]["a"].version, 1);
        assert!(out["notes"].contains_key("n"));
    }

    #[tokio::test]
    async fn drop_collection_leaves_others() {
        let db = Database::in_memory();
        for collection in ["docs", "keep"] {
            db.commit(collection, "a", &Operation::new(1, json!({})), &live("a", 1, json!({})))
                .await
                .unwrap();
        }
        db.drop_collection("docs").await.unwrap();

        assert_eq!(db.get_snapshot("docs", "a").await.unwrap(), Snapshot::absent("a"));
        assert_eq!(db.current_version("docs", "a").await.unwrap(), 0);
        assert_eq!(db.current_version("keep", "a").await.unwrap(), 1);

        db.drop_all().await.unwrap();
        assert_eq!(db.current_version("keep", "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drop_collection_removes_logs_without_snapshots() {
        let db = Database::in_memory();
        // A log append whose snapshot write never happened
        db.log
            .append("docs", "orphan", &Operation::new(1, json!({})), None)
            .await
            .unwrap();
        assert_eq!(db.current_version("docs", "orphan").await.unwrap(), 1);

        db.drop_collection("docs").await.unwrap();
        assert_eq!(db.current_version("docs", "orphan").await.unwrap(), 0);
        assert!(db.log.documents("docs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prefixes_isolate_databases() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let one = Database::with_config(Arc::clone(&store), Config::new().key_prefix("one"));
        let two = Database::with_config(store, Config::new().key_prefix("two"));

        one.commit("docs", "a", &Operation::new(1, json!({})), &live("a", 1, json!({})))
            .await
            .unwrap();
        assert_eq!(one.current_version("docs", "a").await.unwrap(), 1);
        assert_eq!(two.current_version("docs", "a").await.unwrap(), 0);
    }

    #[test]
    fn poll_mode_detection() {
        assert!(Database::needs_poll_mode(&json!({"$limit": 1})).unwrap());
        assert!(!Database::needs_poll_mode(&json!({"a": 1})).unwrap());
        assert!(Database::needs_poll_mode(&json!({"$where": "1"})).is_err());
    }
}
