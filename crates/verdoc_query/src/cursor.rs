//! Sort, skip and limit.

use crate::compare::{compare_values, resolve_path};
use crate::error::{QueryError, QueryResult};
use crate::normalize::CursorOp;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// An ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    /// Parses `{"field": 1, "other": -1}`.
    ///
    /// Key order is significant; earlier keys take precedence.
    pub fn parse(operator: &str, value: &Value) -> QueryResult<Self> {
        let Value::Object(map) = value else {
            return Err(QueryError::invalid_argument(operator, "expected an object"));
        };
        let keys = map
            .iter()
            .map(|(path, dir)| {
                let direction = match dir.as_f64() {
                    Some(d) if d > 0.0 => SortDirection::Asc,
                    Some(d) if d < 0.0 => SortDirection::Desc,
                    _ => {
                        return Err(QueryError::invalid_argument(
                            operator,
                            format!("sort direction for {path} must be 1 or -1"),
                        ))
                    }
                };
                Ok((path.clone(), direction))
            })
            .collect::<QueryResult<_>>()?;
        Ok(Self { keys })
    }

    /// Returns the sort keys.
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two records under this spec.
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for (path, direction) in &self.keys {
            let ordering = compare_values(&sort_key(a, path), &sort_key(b, path));
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of records in place.
    pub fn sort(&self, records: &mut [Map<String, Value>]) {
        if !self.is_empty() {
            records.sort_by(|a, b| self.compare(a, b));
        }
    }
}

/// Missing fields sort as null. For arrays the first resolved value is used.
fn sort_key(record: &Map<String, Value>, path: &str) -> Value {
    resolve_path(record, path)
        .into_iter()
        .next()
        .cloned()
        .unwrap_or(Value::Null)
}

/// Compiled cursor directives.
///
/// Directives are always applied as sort, then skip, then limit, no matter
/// the order they appeared in the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Sort keys; empty keeps storage order.
    pub sort: SortSpec,
    /// Number of leading results to drop.
    pub skip: usize,
    /// Maximum number of results; `None` is unbounded.
    pub limit: Option<usize>,
}

impl Cursor {
    /// Compiles cursor directives.
    ///
    /// A limit of 0 means no limit and a negative limit uses its absolute
    /// value. A negative skip is rejected.
    pub fn from_directives(directives: &[(CursorOp, Value)]) -> QueryResult<Self> {
        let mut cursor = Cursor::default();
        for (op, value) in directives {
            match op {
                CursorOp::Sort => cursor.sort = SortSpec::parse(op.key(), value)?,
                CursorOp::Skip => {
                    let n = integer_arg(op.key(), value)?;
                    if n < 0 {
                        return Err(QueryError::invalid_argument(op.key(), "must be non-negative"));
                    }
                    cursor.skip = usize::try_from(n).unwrap_or(usize::MAX);
                }
                CursorOp::Limit => {
                    let n = integer_arg(op.key(), value)?.unsigned_abs();
                    cursor.limit = match n {
                        0 => None,
                        n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                    };
                }
            }
        }
        Ok(cursor)
    }

    /// Returns true if applying this cursor is a no-op.
    pub fn is_identity(&self) -> bool {
        self.sort.is_empty() && self.skip == 0 && self.limit.is_none()
    }

    /// Applies sort, skip and limit.
    pub fn apply(&self, mut records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        self.sort.sort(&mut records);
        self.window(records)
    }

    /// Applies only skip and limit to already ordered items.
    pub fn window<T>(&self, items: Vec<T>) -> Vec<T> {
        let limit = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(self.skip).take(limit).collect()
    }
}

fn integer_arg(operator: &str, value: &Value) -> QueryResult<i64> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(QueryError::invalid_argument(operator, "expected an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn records(values: &[Value]) -> Vec<Map<String, Value>> {
        values.iter().map(|v| v.as_object().unwrap().clone()).collect()
    }

    fn ids(records: &[Map<String, Value>]) -> Vec<&str> {
        records.iter().map(|r| r["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn sort_multiple_keys() {
        let input = records(&[
            json!({"_id": "a", "g": 1, "n": 2}),
            json!({"_id": "b", "g": 0, "n": 5}),
            json!({"_id": "c", "g": 1, "n": 9}),
        ]);
        let cursor = Cursor::from_directives(&[(CursorOp::Sort, json!({"g": -1, "n": -1}))]).unwrap();
        assert_eq!(ids(&cursor.apply(input)), vec!["c", "a", "b"]);
    }

    #[test]
    fn missing_sort_field_is_null() {
        let input = records(&[
            json!({"_id": "a", "n": 1}),
            json!({"_id": "b"}),
            json!({"_id": "c", "n": 0}),
        ]);
        let cursor = Cursor::from_directives(&[(CursorOp::Sort, json!({"n": 1}))]).unwrap();
        assert_eq!(ids(&cursor.apply(input)), vec!["b", "c", "a"]);
    }

    #[test]
    fn order_is_sort_skip_limit() {
        let input = records(&[
            json!({"_id": "a", "n": 3}),
            json!({"_id": "b", "n": 1}),
            json!({"_id": "c", "n": 2}),
            json!({"_id": "d", "n": 4}),
        ]);
        // Directive order in the query is irrelevant
        let cursor = Cursor::from_directives(&[
            (CursorOp::Limit, json!(2)),
            (CursorOp::Skip, json!(1)),
            (CursorOp::Sort, json!({"n": 1})),
        ])
        .unwrap();
        assert_eq!(ids(&cursor.apply(input)), vec!["c", "a"]);
    }

    #[test]
    fn limit_edge_cases() {
        let zero = Cursor::from_directives(&[(CursorOp::Limit, json!(0))]).unwrap();
        assert_eq!(zero.limit, None);
        let negative = Cursor::from_directives(&[(CursorOp::Limit, json!(-3))]).unwrap();
        assert_eq!(negative.limit, Some(3));
        let float = Cursor::from_directives(&[(CursorOp::Limit, json!(2.0))]).unwrap();
        assert_eq!(float.limit, Some(2));
    }

    #[test]
    fn invalid_directives() {
        assert!(Cursor::from_directives(&[(CursorOp::Skip, json!(-1))]).is_err());
        assert!(Cursor::from_directives(&[(CursorOp::Limit, json!("5"))]).is_err());
        assert!(Cursor::from_directives(&[(CursorOp::Limit, json!(1.5))]).is_err());
        assert!(Cursor::from_directives(&[(CursorOp::Sort, json!({"n": 0}))]).is_err());
        assert!(Cursor::from_directives(&[(CursorOp::Sort, json!([1]))]).is_err());
    }

    proptest! {
        #[test]
        fn window_matches_slice(len in 0usize..40, skip in 0usize..50, limit in 0usize..50) {
            let items: Vec<usize> = (0..len).collect();
            let cursor = Cursor {
                sort: SortSpec::default(),
                skip,
                limit: if limit == 0 { None } else { Some(limit) },
            };
            let out = cursor.window(items.clone());
            let start = skip.min(len);
            let end = if limit == 0 { len } else { (start + limit).min(len) };
            prop_assert_eq!(out, items[start..end].to_vec());
        }

        #[test]
        fn sort_is_ordered_and_stable(values in proptest::collection::vec(0i64..5, 0..30)) {
            let input: Vec<Map<String, Value>> = values
                .iter()
                .enumerate()
                .map(|(i, n)| json!({"i": i, "n": n}).as_object().unwrap().clone())
                .collect();
            let cursor = Cursor::from_directives(&[(CursorOp::Sort, json!({"n": 1}))]).unwrap();
            let out = cursor.apply(input);
            for pair in out.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                let (na, nb) = (a["n"].as_i64().unwrap(), b["n"].as_i64().unwrap());
                prop_assert!(na < nb || (na == nb && a["i"].as_u64() < b["i"].as_u64()));
            }
        }
    }
}
