//! # VerDoc Storage
//!
//! Key-value backend trait and implementations for VerDoc.
//!
//! This crate provides the lowest-level storage abstraction for VerDoc.
//! Backends are **opaque byte stores** addressed by a partition key and an
//! item key. They do not interpret the records they store.
//!
//! ## Design Principles
//!
//! - Backends store bytes under `(partition, item)` and nothing more
//! - A missing item is `None`, never an error
//! - `set` is atomic for a single item
//! - Must be `Send + Sync` so one store can serve many tasks
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`FileStore`] - For persistent storage, one file per item
//!
//! ## Example
//!
//! ```rust
//! use verdoc_storage::{InMemoryStore, KeyValueStore, PartitionKey};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = InMemoryStore::new();
//! let docs = PartitionKey::snapshots("app", "notes");
//! store.set(&docs, "a", b"hello".to_vec()).await.unwrap();
//! assert_eq!(store.get(&docs, "a").await.unwrap(), Some(b"hello".to_vec()));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod file;
mod memory;
mod partition;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use partition::{PartitionKey, PartitionKind};
