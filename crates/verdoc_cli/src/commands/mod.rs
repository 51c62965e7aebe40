//! CLI command implementations.

pub mod drop;
pub mod get;
pub mod ops;
pub mod query;

use std::path::Path;
use std::sync::Arc;
use verdoc_core::{Config, Database};
use verdoc_storage::FileStore;

/// Opens a database over the store directory at `path`.
pub async fn open(path: &Path, prefix: &str) -> Result<Database, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("store directory not found: {}", path.display()).into());
    }
    let store = FileStore::open(path).await?;
    Ok(Database::with_config(
        Arc::new(store),
        Config::new().key_prefix(prefix),
    ))
}
