//! Query command implementation.

use verdoc_core::{Database, Projection};

/// Runs the query command.
pub async fn run(
    db: &Database,
    collection: &str,
    query: &str,
    fields: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let query: serde_json::Value = serde_json::from_str(query)?;
    let output = match fields.map(parse_fields) {
        Some(projection) => db.query_projected(collection, &query, &projection).await?,
        None => db.query(collection, &query).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Parses `a,b , c` into a projection.
fn parse_fields(list: &str) -> Projection {
    Projection::new(list.split(',').map(str::trim).filter(|f| !f.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_trimmed() {
        let projection = parse_fields("title, body,,n ");
        let fields: Vec<&str> = projection.fields().collect();
        assert_eq!(fields, vec!["body", "n", "title"]);
    }
}
