//! # VerDoc Core
//!
//! Versioned document store for VerDoc.
//!
//! This crate provides:
//! - The per-document operation log, indexed by version and by identifier
//! - Optimistic-concurrency commits
//! - Query execution in find, count and aggregate modes
//! - The [`Database`] facade over an injected key-value backend
//!
//! The store persists whatever snapshots and operations the sync layer
//! hands it. It does not resolve conflicts; it only refuses commits that
//! were built on a stale version.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod commit;
mod config;
mod database;
mod error;
mod executor;
mod oplog;
mod snapshots;

pub use commit::CommitCoordinator;
pub use config::{Config, DEFAULT_KEY_PREFIX};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use executor::{QueryExecutor, QueryOutput};
pub use oplog::{version_key, OperationLog};
pub use snapshots::SnapshotStore;

// Re-export the types that appear in the public API
pub use verdoc_codec::{OpId, Operation, Projection, Snapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
