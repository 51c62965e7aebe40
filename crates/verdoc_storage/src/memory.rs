//! In-memory key-value store for testing.

use crate::backend::KeyValueStore;
use crate::error::StorageResult;
use crate::partition::PartitionKey;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Partitions = HashMap<PartitionKey, BTreeMap<String, Vec<u8>>>;

/// An in-memory key-value store.
///
/// This store keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across tasks behind an `Arc`.
/// Locks are never held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    partitions: RwLock<Partitions>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of non-empty partitions.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Returns the total number of items across all partitions.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.partitions.read().values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, partition: &PartitionKey, item: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .read()
            .get(partition)
            .and_then(|items| items.get(item))
            .cloned())
    }

    async fn set(&self, partition: &PartitionKey, item: &str, value: Vec<u8>) -> StorageResult<()> {
        self.partitions
            .write()
            .entry(partition.clone())
            .or_default()
            .insert(item.to_string(), value);
        Ok(())
    }

    async fn list_item_ids(&self, partition: &PartitionKey) -> StorageResult<Vec<String>> {
        Ok(self
            .partitions
            .read()
            .get(partition)
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_partition(&self, partition: &PartitionKey) -> StorageResult<()> {
        self.partitions.write().remove(partition);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.partitions.write().clear();
        Ok(())
    }
}
