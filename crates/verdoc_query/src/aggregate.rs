//! Aggregation pipelines.

use crate::compare::{compare_values, resolve_path, values_equal};
use crate::cursor::SortSpec;
use crate::error::{QueryError, QueryResult};
use crate::predicate::Predicate;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// A compiled aggregation pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// One pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    /// `$match`: keep documents satisfying a predicate.
    Match(Predicate),
    /// `$sort`: stable sort.
    Sort(SortSpec),
    /// `$skip`: drop leading documents.
    Skip(usize),
    /// `$limit`: keep at most this many documents.
    Limit(usize),
    /// `$project`: reshape top-level fields.
    Project(ProjectSpec),
    /// `$count`: replace the stream with `{<field>: n}`.
    Count(String),
    /// `$group`: group by a key and accumulate.
    Group {
        /// Group key expression.
        key: Expr,
        /// Output fields and their accumulators.
        accumulators: Vec<(String, Accumulator)>,
    },
}

/// A field reference (`"$path"`), a literal, or an object of expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Dotted path into the document.
    Path(String),
    /// Constant value.
    Literal(Value),
    /// Object whose fields are expressions.
    Object(Vec<(String, Expr)>),
}

/// Accumulator operator used by `$group`.
#[derive(Debug, Clone)]
pub enum Accumulator {
    /// `$sum`
    Sum(Expr),
    /// `$avg`
    Avg(Expr),
    /// `$min`
    Min(Expr),
    /// `$max`
    Max(Expr),
    /// `$first`
    First(Expr),
    /// `$last`
    Last(Expr),
    /// `$push`
    Push(Expr),
}

/// `$project` body.
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    include_id: bool,
    mode: ProjectMode,
}

#[derive(Debug, Clone)]
enum ProjectMode {
    Include(Vec<(String, Option<Expr>)>),
    Exclude(Vec<String>),
}

impl Pipeline {
    /// Compiles a pipeline.
    ///
    /// Accepts an array of stage objects or a single stage object, which is
    /// treated as a one-stage pipeline.
    pub fn parse(value: &Value) -> QueryResult<Self> {
        let stages = match value {
            Value::Array(items) => items.iter().map(Stage::parse).collect::<QueryResult<_>>()?,
            Value::Object(_) => vec![Stage::parse(value)?],
            _ => return Err(QueryError::malformed("$aggregate expects a stage or an array of stages")),
        };
        Ok(Self { stages })
    }

    /// Returns the compiled stages.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs the pipeline over a document stream.
    pub fn run(&self, mut docs: Vec<Value>) -> Vec<Value> {
        for stage in &self.stages {
            docs = stage.run(docs);
        }
        docs
    }
}

impl Stage {
    fn parse(value: &Value) -> QueryResult<Self> {
        let Value::Object(map) = value else {
            return Err(QueryError::malformed("pipeline stage must be an object"));
        };
        let mut entries = map.iter();
        let (Some((name, arg)), None) = (entries.next(), entries.next()) else {
            return Err(QueryError::malformed("pipeline stage must have exactly one field"));
        };

        match name.as_str() {
            "$match" => match arg {
                Value::Object(filter) => Ok(Stage::Match(Predicate::parse(filter)?)),
                _ => Err(QueryError::invalid_argument(name, "expected an object")),
            },
            "$sort" => {
                let spec = SortSpec::parse(name, arg)?;
                if spec.is_empty() {
                    return Err(QueryError::invalid_argument(name, "expected at least one key"));
                }
                Ok(Stage::Sort(spec))
            }
            "$skip" => Ok(Stage::Skip(count_arg(name, arg)?)),
            "$limit" => match count_arg(name, arg)? {
                0 => Err(QueryError::invalid_argument(name, "must be positive")),
                n => Ok(Stage::Limit(n)),
            },
            "$project" => Ok(Stage::Project(ProjectSpec::parse(arg)?)),
            "$count" => match arg {
                Value::String(field)
                    if !field.is_empty() && !field.starts_with('$') && !field.contains('.') =>
                {
                    Ok(Stage::Count(field.clone()))
                }
                _ => Err(QueryError::invalid_argument(name, "expected a plain field name")),
            },
            "$group" => parse_group(arg),
            other => Err(QueryError::unknown_operator(other)),
        }
    }

    fn run(&self, docs: Vec<Value>) -> Vec<Value> {
        match self {
            Stage::Match(predicate) => docs.into_iter().filter(|d| predicate.matches_value(d)).collect(),
            Stage::Sort(spec) => {
                let empty = Map::new();
                let mut docs = docs;
                docs.sort_by(|a, b| {
                    spec.compare(a.as_object().unwrap_or(&empty), b.as_object().unwrap_or(&empty))
                });
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
            Stage::Count(field) => {
                if docs.is_empty() {
                    return Vec::new();
                }
                let mut out = Map::new();
                out.insert(field.clone(), Value::from(docs.len()));
                vec![Value::Object(out)]
            }
            Stage::Group { key, accumulators } => run_group(key, accumulators, &docs),
        }
    }
}

fn count_arg(operator: &str, value: &Value) -> QueryResult<usize> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| QueryError::invalid_argument(operator, "expected a non-negative integer"))
}

impl Expr {
    fn parse(value: &Value) -> QueryResult<Self> {
        match value {
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() {
                    return Err(QueryError::malformed("empty field path in expression"));
                }
                Ok(Expr::Path(path.to_string()))
            }
            Value::Object(map) => {
                if let Some(op) = map.keys().find(|k| k.starts_with('$')) {
                    return Err(QueryError::unknown_operator(op.as_str()));
                }
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Expr::parse(v)?)))
                    .collect::<QueryResult<_>>()
                    .map(Expr::Object)
            }
            literal => Ok(Expr::Literal(literal.clone())),
        }
    }

    /// Evaluates against a document; `None` for a missing path.
    fn eval(&self, doc: &Value) -> Option<Value> {
        match self {
            Expr::Path(path) => doc
                .as_object()
                .and_then(|map| resolve_path(map, path).into_iter().next().cloned()),
            Expr::Literal(value) => Some(value.clone()),
            Expr::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, e)| e.eval(doc).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }
}

impl ProjectSpec {
    fn parse(value: &Value) -> QueryResult<Self> {
        let Value::Object(spec) = value else {
            return Err(QueryError::invalid_argument("$project", "expected an object"));
        };
        if spec.is_empty() {
            return Err(QueryError::invalid_argument("$project", "expected at least one field"));
        }

        let mut include_id = true;
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for (field, rule) in spec {
            let flag = match rule {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
                _ => None,
            };
            match (field.as_str(), flag) {
                ("_id", Some(keep)) => include_id = keep,
                (_, Some(true)) => included.push((field.clone(), None)),
                (_, Some(false)) => excluded.push(field.clone()),
                (_, None) => included.push((field.clone(), Some(Expr::parse(rule)?))),
            }
        }

        let mode = match (included.is_empty(), excluded.is_empty()) {
            (_, true) => ProjectMode::Include(included),
            (true, false) => ProjectMode::Exclude(excluded),
            (false, false) => {
                return Err(QueryError::invalid_argument(
                    "$project",
                    "cannot mix inclusion and exclusion",
                ))
            }
        };
        Ok(Self { include_id, mode })
    }

    fn apply(&self, doc: &Value) -> Value {
        let Value::Object(source) = doc else {
            return doc.clone();
        };
        let mut out = Map::new();
        match &self.mode {
            // An `_id`-only exclusion leaves an empty inclusion list
            ProjectMode::Include(fields) if fields.is_empty() => {
                out = source.clone();
                if !self.include_id {
                    out.remove("_id");
                }
            }
            ProjectMode::Include(fields) => {
                if self.include_id {
                    if let Some(id) = source.get("_id") {
                        out.insert("_id".to_string(), id.clone());
                    }
                }
                for (field, expr) in fields {
                    let value = match expr {
                        Some(expr) => expr.eval(doc),
                        None => source.get(field).cloned(),
                    };
                    if let Some(value) = value {
                        out.insert(field.clone(), value);
                    }
                }
            }
            ProjectMode::Exclude(fields) => {
                out = source.clone();
                for field in fields {
                    out.remove(field);
                }
                if !self.include_id {
                    out.remove("_id");
                }
            }
        }
        Value::Object(out)
    }
}

fn parse_group(arg: &Value) -> QueryResult<Stage> {
    let Value::Object(spec) = arg else {
        return Err(QueryError::invalid_argument("$group", "expected an object"));
    };
    let key = spec
        .get("_id")
        .map(Expr::parse)
        .transpose()?
        .ok_or_else(|| QueryError::invalid_argument("$group", "an _id expression is required"))?;

    let mut accumulators = Vec::new();
    for (field, body) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        if field.contains('.') {
            return Err(QueryError::invalid_argument("$group", format!("field {field} cannot contain '.'")));
        }
        let Value::Object(body) = body else {
            return Err(QueryError::invalid_argument("$group", format!("{field} must be an accumulator object")));
        };
        let mut entries = body.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(QueryError::invalid_argument("$group", format!("{field} must name exactly one accumulator")));
        };
        let expr = Expr::parse(expr)?;
        let accumulator = match op.as_str() {
            "$sum" => Accumulator::Sum(expr),
            "$avg" => Accumulator::Avg(expr),
            "$min" => Accumulator::Min(expr),
            "$max" => Accumulator::Max(expr),
            "$first" => Accumulator::First(expr),
            "$last" => Accumulator::Last(expr),
            "$push" => Accumulator::Push(expr),
            other => return Err(QueryError::unknown_operator(other)),
        };
        accumulators.push((field.clone(), accumulator));
    }
    Ok(Stage::Group { key, accumulators })
}

/// Running state of one accumulator within one group.
enum AccState {
    Sum { int: Option<i64>, float: f64 },
    Avg { total: f64, count: u64 },
    Extreme { best: Option<Value>, keep: Ordering },
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl AccState {
    fn new(accumulator: &Accumulator) -> Self {
        match accumulator {
            Accumulator::Sum(_) => AccState::Sum { int: Some(0), float: 0.0 },
            Accumulator::Avg(_) => AccState::Avg { total: 0.0, count: 0 },
            Accumulator::Min(_) => AccState::Extreme { best: None, keep: Ordering::Less },
            Accumulator::Max(_) => AccState::Extreme { best: None, keep: Ordering::Greater },
            Accumulator::First(_) => AccState::First(None),
            Accumulator::Last(_) => AccState::Last(Value::Null),
            Accumulator::Push(_) => AccState::Push(Vec::new()),
        }
    }

    fn feed(&mut self, value: Option<Value>) {
        match self {
            AccState::Sum { int, float } => {
                if let Some(Value::Number(n)) = value {
                    *int = match (*int, n.as_i64()) {
                        (Some(acc), Some(x)) => acc.checked_add(x),
                        _ => None,
                    };
                    *float += n.as_f64().unwrap_or(0.0);
                }
            }
            AccState::Avg { total, count } => {
                if let Some(Value::Number(n)) = value {
                    *total += n.as_f64().unwrap_or(0.0);
                    *count += 1;
                }
            }
            AccState::Extreme { best, keep } => {
                let Some(value) = value.filter(|v| !v.is_null()) else {
                    return;
                };
                let replace = best
                    .as_ref()
                    .map_or(true, |current| compare_values(&value, current) == *keep);
                if replace {
                    *best = Some(value);
                }
            }
            AccState::First(first) => {
                if first.is_none() {
                    *first = Some(value.unwrap_or(Value::Null));
                }
            }
            AccState::Last(last) => *last = value.unwrap_or(Value::Null),
            AccState::Push(items) => items.extend(value),
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum { int: Some(n), .. } => Value::from(n),
            AccState::Sum { int: None, float } => float_value(float),
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { total, count } => float_value(total / count as f64),
            AccState::Extreme { best, .. } => best.unwrap_or(Value::Null),
            AccState::First(first) => first.unwrap_or(Value::Null),
            AccState::Last(last) => last,
            AccState::Push(items) => Value::Array(items),
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn accumulator_expr(accumulator: &Accumulator) -> &Expr {
    match accumulator {
        Accumulator::Sum(e)
        | Accumulator::Avg(e)
        | Accumulator::Min(e)
        | Accumulator::Max(e)
        | Accumulator::First(e)
        | Accumulator::Last(e)
        | Accumulator::Push(e) => e,
    }
}

fn run_group(key: &Expr, accumulators: &[(String, Accumulator)], docs: &[Value]) -> Vec<Value> {
    // Groups are emitted in order of first appearance
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();
    for doc in docs {
        let group_key = key.eval(doc).unwrap_or(Value::Null);
        let index = match groups.iter().position(|(k, _)| values_equal(k, &group_key)) {
            Some(index) => index,
            None => {
                let states = accumulators.iter().map(|(_, a)| AccState::new(a)).collect();
                groups.push((group_key, states));
                groups.len() - 1
            }
        };
        for ((_, accumulator), state) in accumulators.iter().zip(groups[index].1.iter_mut()) {
            state.feed(accumulator_expr(accumulator).eval(doc));
        }
    }

    groups
        .into_iter()
        .map(|(group_key, states)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), group_key);
            for ((field, _), state) in accumulators.iter().zip(states) {
                out.insert(field.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(pipeline: Value, docs: Value) -> Value {
        let docs = docs.as_array().unwrap().clone();
        Value::Array(Pipeline::parse(&pipeline).unwrap().run(docs))
    }

    fn orders() -> Value {
        json!([
            {"_id": "1", "cust": "ann", "qty": 2, "price": 1.5, "status": "open"},
            {"_id": "2", "cust": "bob", "qty": 1, "price": 4.0, "status": "open"},
            {"_id": "3", "cust": "ann", "qty": 5, "price": 2.0, "status": "done"},
            {"_id": "4", "cust": "cid", "qty": 3, "status": "open"}
        ])
    }

    #[test]
    fn single_stage_is_coerced() {
        let out = run(json!({"$match": {"status": "done"}}), orders());
        assert_eq!(out, json!([{"_id": "3", "cust": "ann", "qty": 5, "price": 2.0, "status": "done"}]));
    }

    #[test]
    fn match_sort_skip_limit() {
        let out = run(
            json!([
                {"$match": {"status": "open"}},
                {"$sort": {"qty": -1}},
                {"$skip": 1},
                {"$limit": 1},
                {"$project": {"qty": 1}}
            ]),
            orders(),
        );
        assert_eq!(out, json!([{"_id": "1", "qty": 2}]));
    }

    #[test]
    fn group_accumulators() {
        let out = run(
            json!([
                {"$group": {
                    "_id": "$cust",
                    "total": {"$sum": "$qty"},
                    "orders": {"$sum": 1},
                    "avg": {"$avg": "$price"},
                    "most": {"$max": "$qty"},
                    "least": {"$min": "$price"},
                    "first": {"$first": "$_id"},
                    "last": {"$last": "$_id"},
                    "ids": {"$push": "$_id"}
                }}
            ]),
            orders(),
        );
        assert_eq!(
            out,
            json!([
                {"_id": "ann", "total": 7, "orders": 2, "avg": 1.75, "most": 5, "least": 1.5,
                 "first": "1", "last": "3", "ids": ["1", "3"]},
                {"_id": "bob", "total": 1, "orders": 1, "avg": 4.0, "most": 1, "least": 4.0,
                 "first": "2", "last": "2", "ids": ["2"]},
                {"_id": "cid", "total": 3, "orders": 1, "avg": null, "most": 3, "least": null,
                 "first": "4", "last": "4", "ids": ["4"]}
            ])
        );
    }

    #[test]
    fn group_null_key_and_float_sum() {
        let out = run(json!({"$group": {"_id": null, "sum": {"$sum": "$price"}}}), orders());
        assert_eq!(out, json!([{"_id": null, "sum": 7.5}]));
    }

    #[test]
    fn count_stage() {
        let out = run(json!([{"$match": {"status": "open"}}, {"$count": "n"}]), orders());
        assert_eq!(out, json!([{"n": 3}]));
        let none = run(json!([{"$match": {"status": "gone"}}, {"$count": "n"}]), orders());
        assert_eq!(none, json!([]));
    }

    #[test]
    fn project_exclusion_and_computed() {
        let out = run(json!([{"$limit": 1}, {"$project": {"price": 0, "status": 0, "_id": 0}}]), orders());
        assert_eq!(out, json!([{"cust": "ann", "qty": 2}]));

        let out = run(json!([{"$limit": 1}, {"$project": {"who": "$cust", "_id": false}}]), orders());
        assert_eq!(out, json!([{"who": "ann"}]));
    }

    #[test]
    fn parse_errors() {
        let err = |v: Value| Pipeline::parse(&v).unwrap_err();
        assert_eq!(err(json!([{"$out": "x"}])), QueryError::unknown_operator("$out"));
        assert_eq!(
            err(json!({"$group": {"_id": 1, "x": {"$stdDevPop": "$a"}}})),
            QueryError::unknown_operator("$stdDevPop")
        );
        assert!(matches!(err(json!("nope")), QueryError::Malformed { .. }));
        assert!(matches!(err(json!([{"$match": {}, "$limit": 1}])), QueryError::Malformed { .. }));
        assert!(matches!(err(json!({"$limit": 0})), QueryError::InvalidArgument { .. }));
        assert!(matches!(err(json!({"$group": {"n": {"$sum": 1}}})), QueryError::InvalidArgument { .. }));
        assert!(matches!(
            err(json!({"$project": {"a": 1, "b": 0}})),
            QueryError::InvalidArgument { .. }
        ));
        assert_eq!(err(json!({"$match": {"$where": "1"}})), QueryError::disallowed("$where"));
    }
}
