//! Operation log commands.

use serde::Serialize;
use verdoc_core::{Database, Operation};

/// Operation representation for output.
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    /// Version produced by the operation.
    pub version: u64,
    /// Operation identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Previous operation in the chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    /// Operation in wire form.
    pub op: serde_json::Value,
}

impl From<&Operation> for OperationInfo {
    fn from(op: &Operation) -> Self {
        Self {
            version: op.version,
            id: op.id.map(|id| id.to_string()),
            prev: op.prev.map(|id| id.to_string()),
            op: op.to_value(),
        }
    }
}

/// Runs the ops command.
pub async fn run(
    db: &Database,
    collection: &str,
    id: &str,
    from: u64,
    to: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ops = db.get_operations(collection, id, from, to).await?;
    print_operations(&ops, format)
}

/// Runs the history command.
pub async fn history(
    db: &Database,
    collection: &str,
    id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ops = db.operation_history(collection, id).await?;
    print_operations(&ops, format)
}

fn print_operations(ops: &[Operation], format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let infos: Vec<OperationInfo> = ops.iter().map(OperationInfo::from).collect();
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        _ => {
            print_text_output(&infos);
        }
    }
    Ok(())
}

fn print_text_output(infos: &[OperationInfo]) {
    if infos.is_empty() {
        println!("No operations");
        return;
    }
    println!("{:>8}  {:<36}  OPERATION", "VERSION", "ID");
    for info in infos {
        println!(
            "{:>8}  {:<36}  {}",
            info.version,
            info.id.as_deref().unwrap_or("-"),
            info.op
        );
    }
    println!();
    println!("Total: {} operations", infos.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_info_uses_wire_form() {
        let op = Operation::new(4, json!({"op": []}));
        let info = OperationInfo::from(&op);
        assert_eq!(info.version, 4);
        assert_eq!(info.id, None);
        assert_eq!(info.op, json!({"op": [], "v": 4}));
    }
}
