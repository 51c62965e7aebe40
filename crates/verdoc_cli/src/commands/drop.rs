//! Drop command implementation.

use tracing::info;
use verdoc_core::Database;

/// Runs the drop command.
pub async fn run(db: &Database, collection: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Dropping collection {}", collection);
    db.drop_collection(collection).await?;
    println!("Dropped {collection}");
    Ok(())
}
