//! Key-value backend trait definition.

use crate::error::StorageResult;
use crate::partition::PartitionKey;
use async_trait::async_trait;

/// An asynchronous key-value backend for VerDoc.
///
/// Backends are **opaque byte stores**. VerDoc owns the record format;
/// backends never look inside the bytes they are given.
///
/// # Invariants
///
/// - `get` after a successful `set` returns exactly the bytes written
/// - `get` of an unknown item returns `Ok(None)`
/// - `set` replaces the whole item atomically; readers never observe a
///   partially written value
/// - `list_item_ids` returns item keys in ascending byte order
/// - Partitions with different keys never share items
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn get(&self, partition: &PartitionKey, item: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes one item, replacing any previous value.
    ///
    /// The partition is created implicitly on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set(&self, partition: &PartitionKey, item: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Lists the item keys of a partition in ascending order.
    ///
    /// An unknown partition has no items.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn list_item_ids(&self, partition: &PartitionKey) -> StorageResult<Vec<String>>;

    /// Removes a partition and every item in it.
    ///
    /// Removing an unknown partition is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn delete_partition(&self, partition: &PartitionKey) -> StorageResult<()>;

    /// Removes everything from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn clear(&self) -> StorageResult<()>;
}
