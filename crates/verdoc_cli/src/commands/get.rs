//! Get command implementation.

use verdoc_core::Database;

/// Runs the get command.
pub async fn run(db: &Database, collection: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = db.get_snapshot(collection, id).await?;
    if !snapshot.exists() {
        return Err(format!("document {collection}/{id} not found").into());
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
