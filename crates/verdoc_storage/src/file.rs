//! Directory-backed key-value store for persistent storage.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use crate::partition::{PartitionKey, PartitionKind};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A directory-backed key-value store.
///
/// Every partition is a directory and every item a file inside it. Names
/// are hex-encoded so arbitrary collection names and document ids map to
/// portable file names.
///
/// ```text
/// <root>/<hex prefix>/<hex collection>/s/<hex id>            snapshots
/// <root>/<hex prefix>/<hex collection>/o/<hex id>/<hex ver>  operation log
/// <root>/<hex prefix>/<hex collection>/i/<hex op id>         operation index
/// ```
///
/// # Durability
///
/// Items are written to a temporary file in the target directory and then
/// renamed over the final name, so a reader sees either the old or the new
/// value. With [`FileStore::with_sync`] the temporary file is also synced
/// before the rename.
///
/// # Example
///
/// ```no_run
/// use verdoc_storage::{FileStore, KeyValueStore, PartitionKey};
///
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let store = FileStore::open("data").await.unwrap();
/// let docs = PartitionKey::snapshots("app", "notes");
/// store.set(&docs, "a", b"persistent".to_vec()).await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    sync_writes: bool,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Opens or creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            sync_writes: false,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Sets whether every write is synced to disk before it becomes visible.
    #[must_use]
    pub fn with_sync(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &PartitionKey) -> PathBuf {
        let mut dir = self
            .root
            .join(hex_encode(partition.prefix()))
            .join(hex_encode(partition.collection()))
            .join(partition.kind().marker());
        if let PartitionKind::Operations { doc } = partition.kind() {
            dir.push(hex_encode(doc));
        }
        dir
    }

    async fn write_atomic(&self, dir: &Path, name: &str, value: &[u8]) -> StorageResult<()> {
        fs::create_dir_all(dir).await?;

        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{name}.{}.{seq}.tmp", std::process::id()));
        let target = dir.join(name);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(value).await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        drop(file);

        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, partition: &PartitionKey, item: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.partition_dir(partition).join(hex_encode(item));
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, partition: &PartitionKey, item: &str, value: Vec<u8>) -> StorageResult<()> {
        let dir = self.partition_dir(partition);
        self.write_atomic(&dir, &hex_encode(item), &value).await
    }

    async fn list_item_ids(&self, partition: &PartitionKey) -> StorageResult<Vec<String>> {
        let dir = self.partition_dir(partition);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_str().ok_or_else(|| {
                StorageError::corrupted(format!("non UTF-8 file name in {}", dir.display()))
            })?;
            // In-flight temporary files
            if name.starts_with('.') {
                continue;
            }
            let id = hex_decode(name).ok_or_else(|| {
                StorageError::corrupted(format!("unexpected file {name} in {}", dir.display()))
            })?;
            ids.push(id);
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete_partition(&self, partition: &PartitionKey) -> StorageResult<()> {
        let dir = self.partition_dir(partition);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(partition = %partition, "removed partition directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> StorageResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

fn hex_encode(s: &str) -> String {
    // An empty name still needs a file name
    if s.is_empty() {
        return "_".to_string();
    }
    hex::encode(s)
}

fn hex_decode(s: &str) -> Option<String> {
    if s == "_" {
        return Some(String::new());
    }
    let bytes = hex::decode(s).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn docs() -> PartitionKey {
        PartitionKey::snapshots("test", "docs")
    }

    #[test]
    fn hex_roundtrip() {
        for s in ["", "a", "docs/with:separators", "ünïcode"] {
            assert_eq!(hex_decode(&hex_encode(s)).as_deref(), Some(s));
        }
        assert_eq!(hex_decode("zz"), None);
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_encode("docs"), "646f6373");
        assert_eq!(hex_encode(""), "_");
    }

    #[tokio::test]
    async fn file_set_then_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get(&docs(), "a").await.unwrap(), None);
        store.set(&docs(), "a", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get(&docs(), "a").await.unwrap(), Some(b"hello".to_vec()));

        store.set(&docs(), "a", b"again".to_vec()).await.unwrap();
        assert_eq!(store.get(&docs(), "a").await.unwrap(), Some(b"again".to_vec()));
    }

    #[tokio::test]
    async fn file_persists_across_open() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap().with_sync(true);
            store.set(&docs(), "a", b"durable".to_vec()).await.unwrap();
        }
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get(&docs(), "a").await.unwrap(), Some(b"durable".to_vec()));
    }

    #[tokio::test]
    async fn file_list_is_sorted_and_decoded() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        for id in ["b", "a/x", "c"] {
            store.set(&docs(), id, vec![]).await.unwrap();
        }
        assert_eq!(
            store.list_item_ids(&docs()).await.unwrap(),
            vec!["a/x", "b", "c"]
        );
    }

    #[tokio::test]
    async fn file_operation_partitions_are_isolated() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let ops_a = PartitionKey::operations("test", "docs", "a");
        let ops_b = PartitionKey::operations("test", "docs", "b");

        store.set(&ops_a, "1", b"a1".to_vec()).await.unwrap();
        store.set(&ops_b, "1", b"b1".to_vec()).await.unwrap();
        store.set(&docs(), "a", b"snap".to_vec()).await.unwrap();

        assert_eq!(store.list_item_ids(&ops_a).await.unwrap(), vec!["1"]);
        assert_eq!(store.get(&ops_b, "1").await.unwrap(), Some(b"b1".to_vec()));
        assert_eq!(store.list_item_ids(&docs()).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn file_delete_partition_and_clear() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let other = PartitionKey::snapshots("test", "other");

        store.set(&docs(), "a", vec![1]).await.unwrap();
        store.set(&other, "a", vec![2]).await.unwrap();

        store.delete_partition(&docs()).await.unwrap();
        store.delete_partition(&docs()).await.unwrap();
        assert!(store.list_item_ids(&docs()).await.unwrap().is_empty());
        assert_eq!(store.get(&other, "a").await.unwrap(), Some(vec![2]));

        store.clear().await.unwrap();
        assert_eq!(store.get(&other, "a").await.unwrap(), None);
        assert!(store.root().exists());
    }
}
