//! Snapshot records in the backend.

use crate::error::CoreResult;
use std::sync::Arc;
use verdoc_codec::{decode_record, record_from_bytes, record_to_bytes, Record, Snapshot};
use verdoc_storage::{KeyValueStore, PartitionKey};

/// Reads and writes encoded snapshots, one item per document id.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SnapshotStore {
    /// Creates a snapshot store over a backend.
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn partition(&self, collection: &str) -> PartitionKey {
        PartitionKey::snapshots(self.prefix.as_str(), collection)
    }

    /// Reads the raw record of one document.
    pub async fn get_record(&self, collection: &str, id: &str) -> CoreResult<Option<Record>> {
        match self.store.get(&self.partition(collection), id).await? {
            Some(bytes) => Ok(Some(record_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads one snapshot. A document that was never written is returned
    /// at version 0.
    pub async fn get(&self, collection: &str, id: &str) -> CoreResult<Snapshot> {
        match self.get_record(collection, id).await? {
            Some(record) => Ok(decode_record(&record)?),
            None => Ok(Snapshot::absent(id)),
        }
    }

    /// Writes the record of one document.
    pub async fn put(&self, collection: &str, id: &str, record: &Record) -> CoreResult<()> {
        let bytes = record_to_bytes(record)?;
        self.store.set(&self.partition(collection), id, bytes).await?;
        Ok(())
    }

    /// Lists document ids in ascending order.
    pub async fn ids(&self, collection: &str) -> CoreResult<Vec<String>> {
        Ok(self.store.list_item_ids(&self.partition(collection)).await?)
    }

    /// Reads every record of a collection in id order.
    ///
    /// Ids listed but gone by the time they are read are skipped.
    pub async fn records(&self, collection: &str) -> CoreResult<Vec<Record>> {
        let partition = self.partition(collection);
        let ids = self.store.list_item_ids(&partition).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.store.get(&partition, &id).await? {
                records.push(record_from_bytes(&bytes)?);
            }
        }
        Ok(records)
    }

    /// Removes every snapshot of a collection.
    pub async fn drop_collection(&self, collection: &str) -> CoreResult<()> {
        self.store.delete_partition(&self.partition(collection)).await?;
        Ok(())
    }
}
