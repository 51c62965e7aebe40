//! Query normalization.
//!
//! A caller's query object mixes filter clauses, meta-operators and cursor
//! operators at the top level. [`normalize`] separates them into a
//! [`NormalizedQuery`] and compiles every part, so later stages never look
//! at raw keys again.

use crate::aggregate::Pipeline;
use crate::cursor::Cursor;
use crate::error::{QueryError, QueryResult};
use crate::predicate::Predicate;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use verdoc_codec::fields;

/// Key holding the filter in boxed form.
pub const QUERY_KEY: &str = "$query";

/// Key selecting aggregate mode.
pub const AGGREGATE_KEY: &str = "$aggregate";

/// Operators that are never executed.
const DISALLOWED_MODES: &[&str] = &["$mapReduce"];

/// Recognized meta-operators. They pass through normalization untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaOperator {
    /// `$comment`
    Comment,
    /// `$explain`
    Explain,
    /// `$hint`
    Hint,
    /// `$maxScan`
    MaxScan,
    /// `$max`
    Max,
    /// `$min`
    Min,
    /// `$orderby`
    OrderBy,
    /// `$returnKey`
    ReturnKey,
    /// `$showDiskLoc`
    ShowDiskLoc,
    /// `$snapshot`
    Snapshot,
    /// `$count`
    Count,
}

impl MetaOperator {
    const ALL: [MetaOperator; 11] = [
        MetaOperator::Comment,
        MetaOperator::Explain,
        MetaOperator::Hint,
        MetaOperator::MaxScan,
        MetaOperator::Max,
        MetaOperator::Min,
        MetaOperator::OrderBy,
        MetaOperator::ReturnKey,
        MetaOperator::ShowDiskLoc,
        MetaOperator::Snapshot,
        MetaOperator::Count,
    ];

    /// Returns the wire key, e.g. `"$maxScan"`.
    pub const fn key(self) -> &'static str {
        match self {
            MetaOperator::Comment => "$comment",
            MetaOperator::Explain => "$explain",
            MetaOperator::Hint => "$hint",
            MetaOperator::MaxScan => "$maxScan",
            MetaOperator::Max => "$max",
            MetaOperator::Min => "$min",
            MetaOperator::OrderBy => "$orderby",
            MetaOperator::ReturnKey => "$returnKey",
            MetaOperator::ShowDiskLoc => "$showDiskLoc",
            MetaOperator::Snapshot => "$snapshot",
            MetaOperator::Count => "$count",
        }
    }

    /// Parses a wire key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.key() == key)
    }
}

/// Cursor directives, in wire form `$limit`, `$skip` and `$orderby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorOp {
    /// `$limit`
    Limit,
    /// `$skip`
    Skip,
    /// `$orderby`, applied as a sort.
    Sort,
}

impl CursorOp {
    /// Returns the wire key.
    pub const fn key(self) -> &'static str {
        match self {
            CursorOp::Limit => "$limit",
            CursorOp::Skip => "$skip",
            CursorOp::Sort => "$orderby",
        }
    }

    /// Parses a wire key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$limit" => Some(CursorOp::Limit),
            "$skip" => Some(CursorOp::Skip),
            "$orderby" => Some(CursorOp::Sort),
            _ => None,
        }
    }
}

/// How a query is executed.
#[derive(Debug, Clone)]
pub enum QueryMode {
    /// Return matching documents.
    Find,
    /// Return only the number of matching documents.
    Count,
    /// Run an aggregation pipeline over the raw collection.
    Aggregate(Pipeline),
}

/// A query split into its parts and compiled.
#[derive(Debug, Clone)]
pub struct NormalizedQuery {
    /// Filter clauses, including the deletion guard.
    pub filter: Map<String, Value>,
    /// Passed-through meta-operators.
    pub meta: BTreeMap<MetaOperator, Value>,
    /// Cursor directives in the order they appeared.
    pub cursor: Vec<(CursorOp, Value)>,
    /// Execution mode.
    pub mode: QueryMode,
    /// Compiled `filter`.
    pub predicate: Predicate,
    /// Compiled `cursor`.
    pub plan: Cursor,
}

impl NormalizedQuery {
    /// Returns true if results depend on the whole collection rather than
    /// on each document alone (sorting, paging or counting).
    pub fn needs_poll_mode(&self) -> bool {
        !self.cursor.is_empty() || self.meta.contains_key(&MetaOperator::Count)
    }

    /// Returns the canonical boxed form of this query.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert(QUERY_KEY.to_string(), Value::Object(self.filter.clone()));
        for (op, value) in &self.meta {
            out.insert(op.key().to_string(), value.clone());
        }
        for (op, value) in &self.cursor {
            out.insert(op.key().to_string(), value.clone());
        }
        Value::Object(out)
    }
}

/// Normalizes a query object.
///
/// Top-level keys are routed to the cursor list (`$limit`, `$skip`,
/// `$orderby`), the meta map (other meta-operators), the mode (`$count`,
/// `$aggregate`) or the filter (everything else). A query already carrying
/// `$query` is taken as boxed: its filter is cloned from `$query` and any
/// other non-operator key is rejected.
///
/// Unless the filter already mentions `_type`, `{"_type": {"$ne": null}}`
/// is added so deleted documents are skipped.
///
/// # Errors
///
/// Fails on non-object input, on `$where` and `$mapReduce`, and on any
/// filter, cursor or pipeline that does not compile.
pub fn normalize(query: &Value) -> QueryResult<NormalizedQuery> {
    let Value::Object(input) = query else {
        return Err(QueryError::malformed("query must be an object"));
    };

    let boxed = input.contains_key(QUERY_KEY);
    let mut filter = match input.get(QUERY_KEY) {
        None => Map::new(),
        Some(Value::Object(inner)) => inner.clone(),
        Some(_) => return Err(QueryError::malformed("$query must be an object")),
    };
    let mut meta = BTreeMap::new();
    let mut cursor = Vec::new();
    let mut pipeline = None;

    for (key, value) in input {
        if let Some(op) = CursorOp::from_key(key) {
            cursor.push((op, value.clone()));
        } else if let Some(op) = MetaOperator::from_key(key) {
            meta.insert(op, value.clone());
        } else if key == AGGREGATE_KEY {
            pipeline = Some(value);
        } else if DISALLOWED_MODES.contains(&key.as_str()) {
            return Err(QueryError::disallowed(key.as_str()));
        } else if key == QUERY_KEY {
            continue;
        } else if boxed {
            return Err(QueryError::malformed(format!(
                "unexpected key {key} next to $query"
            )));
        } else {
            filter.insert(key.clone(), value.clone());
        }
    }

    if !filter.contains_key(fields::TYPE) {
        filter.insert(fields::TYPE.to_string(), json!({"$ne": null}));
    }

    let counting = meta.get(&MetaOperator::Count).is_some_and(is_truthy);
    let mode = match pipeline {
        _ if counting => QueryMode::Count,
        Some(stages) => QueryMode::Aggregate(Pipeline::parse(stages)?),
        None => QueryMode::Find,
    };

    let predicate = Predicate::parse(&filter)?;
    let plan = Cursor::from_directives(&cursor)?;

    Ok(NormalizedQuery {
        filter,
        meta,
        cursor,
        mode,
        predicate,
        plan,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::SortDirection;
    use proptest::prelude::*;

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn splits_filter_meta_and_cursor() {
        let q = normalize(&json!({
            "status": "open",
            "$limit": 5,
            "$comment": "hi",
            "$orderby": {"n": 1},
            "$skip": 2
        }))
        .unwrap();

        assert_eq!(
            q.filter,
            doc(json!({"status": "open", "_type": {"$ne": null}}))
        );
        assert_eq!(q.meta.get(&MetaOperator::Comment), Some(&json!("hi")));
        let ops: Vec<CursorOp> = q.cursor.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![CursorOp::Limit, CursorOp::Sort, CursorOp::Skip]);
        assert_eq!(q.plan.skip, 2);
        assert_eq!(q.plan.limit, Some(5));
        assert_eq!(q.plan.sort.keys(), &[("n".to_string(), SortDirection::Asc)]);
        assert!(matches!(q.mode, QueryMode::Find));
    }

    #[test]
    fn boxed_form_is_not_reboxed() {
        let q = normalize(&json!({"$query": {"a": {"$gt": 1}}, "$limit": 1})).unwrap();
        assert_eq!(q.filter, doc(json!({"a": {"$gt": 1}, "_type": {"$ne": null}})));

        let again = normalize(&q.to_value()).unwrap();
        assert_eq!(again.filter, q.filter);
        assert_eq!(again.cursor, q.cursor);
    }

    #[test]
    fn boxed_form_rejects_stray_fields() {
        let err = normalize(&json!({"$query": {}, "a": 1})).unwrap_err();
        assert!(matches!(err, QueryError::Malformed { .. }));
        let err = normalize(&json!({"$query": 3})).unwrap_err();
        assert!(matches!(err, QueryError::Malformed { .. }));
    }

    #[test]
    fn explicit_type_filter_skips_guard() {
        let q = normalize(&json!({"_type": null})).unwrap();
        assert_eq!(q.filter, doc(json!({"_type": null})));
        assert!(q.predicate.matches(&doc(json!({"_id": "x", "_type": null}))));
    }

    #[test]
    fn guard_excludes_tombstones() {
        let q = normalize(&json!({})).unwrap();
        assert!(q.predicate.matches(&doc(json!({"_id": "a", "_type": "t"}))));
        assert!(!q.predicate.matches(&doc(json!({"_id": "b", "_type": null}))));
    }

    #[test]
    fn modes() {
        let count = normalize(&json!({"$count": true, "status": "open"})).unwrap();
        assert!(matches!(count.mode, QueryMode::Count));
        assert!(count.needs_poll_mode());

        let not_count = normalize(&json!({"$count": false})).unwrap();
        assert!(matches!(not_count.mode, QueryMode::Find));

        let agg = normalize(&json!({"$aggregate": [{"$match": {}}]})).unwrap();
        assert!(matches!(agg.mode, QueryMode::Aggregate(_)));
        assert!(!agg.filter.contains_key(AGGREGATE_KEY));

        let both = normalize(&json!({"$count": 1, "$aggregate": []})).unwrap();
        assert!(matches!(both.mode, QueryMode::Count));
    }

    #[test]
    fn poll_mode() {
        assert!(!normalize(&json!({"a": 1})).unwrap().needs_poll_mode());
        assert!(!normalize(&json!({"$comment": "x"})).unwrap().needs_poll_mode());
        assert!(normalize(&json!({"$orderby": {"a": 1}})).unwrap().needs_poll_mode());
        assert!(normalize(&json!({"$skip": 1})).unwrap().needs_poll_mode());
    }

    #[test]
    fn rejects_bad_queries() {
        assert!(matches!(normalize(&json!([1])), Err(QueryError::Malformed { .. })));
        assert_eq!(
            normalize(&json!({"$where": "true"})).unwrap_err(),
            QueryError::disallowed("$where")
        );
        assert_eq!(
            normalize(&json!({"$mapReduce": {}})).unwrap_err(),
            QueryError::disallowed("$mapReduce")
        );
        assert_eq!(
            normalize(&json!({"$geoNear": {}})).unwrap_err(),
            QueryError::unknown_operator("$geoNear")
        );
        assert!(normalize(&json!({"$limit": "ten"})).is_err());
        assert!(normalize(&json!({"$aggregate": [{"$bogus": 1}]})).is_err());
    }

    #[test]
    fn meta_operator_keys_round_trip() {
        for op in MetaOperator::ALL {
            assert_eq!(MetaOperator::from_key(op.key()), Some(op));
        }
        assert_eq!(MetaOperator::from_key("$limit"), None);
    }

    proptest! {
        #[test]
        fn cursor_plan_ignores_key_order(
            perm in Just(vec![0usize, 1, 2]).prop_shuffle(),
            skip in 0i64..10,
            limit in 0i64..10,
        ) {
            let entries = [
                ("$skip", json!(skip)),
                ("$limit", json!(limit)),
                ("$orderby", json!({"n": -1})),
            ];
            let mut query = Map::new();
            for i in &perm {
                let (k, v) = &entries[*i];
                query.insert((*k).to_string(), v.clone());
            }
            let q = normalize(&Value::Object(query)).unwrap();

            let expected = Cursor::from_directives(&[
                (CursorOp::Sort, json!({"n": -1})),
                (CursorOp::Skip, json!(skip)),
                (CursorOp::Limit, json!(limit)),
            ]).unwrap();
            prop_assert_eq!(q.plan, expected);
            let order: Vec<&str> = q.cursor.iter().map(|(op, _)| op.key()).collect();
            let input_order: Vec<&str> = perm.iter().map(|i| entries[*i].0).collect();
            prop_assert_eq!(order, input_order);
        }
    }
}
