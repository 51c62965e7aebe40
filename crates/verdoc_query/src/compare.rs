//! Value ordering, equality and path resolution.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Rank of a value's type in the cross-type sort order.
///
/// Follows the BSON comparison order:
/// null < numbers < strings < objects < arrays < booleans.
pub(crate) fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 8,
    }
}

fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a.cmp(&b);
    }
    let a = a.as_f64().unwrap_or(f64::NAN);
    let b = b.as_f64().unwrap_or(f64::NAN);
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Total order over JSON values.
///
/// Values of different types are ordered by type rank; values of the same
/// type by their natural order. Arrays and objects compare element by
/// element, then by length.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .zip(b)
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(va, vb)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => Ordering::Equal,
    }
}

/// Equality with numeric normalization (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Resolves a dotted path against a record.
///
/// Arrays are traversed implicitly: `tags.name` on
/// `{"tags": [{"name": "a"}, {"name": "b"}]}` yields both names. A numeric
/// segment also indexes into an array. Missing paths yield nothing.
pub fn resolve_path<'a>(record: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    let mut segments = path.split('.');
    if let Some(head) = segments.next() {
        if let Some(value) = record.get(head) {
            let rest: Vec<&str> = segments.collect();
            walk(value, &rest, &mut out);
        }
    }
    out
}

fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                walk(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(child) = items.get(index) {
                    walk(child, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                walk(item, segments, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cross_type_order() {
        let ordered = [json!(null), json!(-3), json!(2.5), json!("a"), json!({}), json!([]), json!(false)];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn numeric_order_mixes_ints_and_floats() {
        assert_eq!(compare_values(&json!(2), &json!(2.5)), Ordering::Less);
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Ordering::Less);
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1]}), &json!({"a": [1.0]})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn resolve_nested_and_arrays() {
        let record = json!({
            "a": {"b": 1},
            "tags": [{"name": "x"}, {"name": "y"}],
            "list": [10, 20]
        });
        let record = record.as_object().unwrap();

        assert_eq!(resolve_path(record, "a.b"), vec![&json!(1)]);
        assert_eq!(resolve_path(record, "tags.name"), vec![&json!("x"), &json!("y")]);
        assert_eq!(resolve_path(record, "list.1"), vec![&json!(20)]);
        assert!(resolve_path(record, "a.c").is_empty());
        assert!(resolve_path(record, "missing").is_empty());
    }
}
