//! Compiled filter predicates.

use crate::compare::{compare_values, resolve_path, type_rank, values_equal};
use crate::error::{QueryError, QueryResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A compiled filter.
///
/// Built once from a filter object with [`Predicate::parse`]; matching is
/// infallible afterwards.
///
/// Supported operators: implicit equality, `$eq $ne $gt $gte $lt $lte $in
/// $nin $exists $type $size $all $elemMatch $regex $options $mod $not`
/// and the logical `$and $or $nor`.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Every child matches. An empty list matches everything.
    And(Vec<Predicate>),
    /// At least one child matches.
    Or(Vec<Predicate>),
    /// No child matches.
    Nor(Vec<Predicate>),
    /// Every condition holds for the values at `path`.
    Field {
        /// Dotted field path.
        path: String,
        /// Conditions on the resolved values.
        conditions: Vec<Condition>,
    },
}

/// One operator applied to the values at a path.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equal to, or an array containing, the value.
    Eq(Value),
    /// Negation of [`Condition::Eq`].
    Ne(Value),
    /// Ordered comparison within the same type.
    Cmp(Ordering, bool, Value),
    /// Equal to any listed value.
    In(Vec<Value>),
    /// Equal to none of the listed values.
    Nin(Vec<Value>),
    /// The path is present (or absent).
    Exists(bool),
    /// The value has one of the given type ranks.
    Type(Vec<u8>),
    /// An array of exactly this length.
    Size(usize),
    /// An array containing every listed value.
    All(Vec<Value>),
    /// An array with at least one matching element.
    ElemMatch(Box<ElemMatch>),
    /// A string matching the regex.
    Regex(Regex),
    /// A number with `value % divisor == remainder`.
    Mod(i64, i64),
    /// Negation of a group of conditions.
    Not(Vec<Condition>),
}

/// Body of an `$elemMatch`.
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Operator conditions applied to each element as a value.
    Value(Vec<Condition>),
    /// A full predicate applied to each element as a document.
    Document(Predicate),
}

impl Predicate {
    /// A predicate that matches every record.
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    /// Compiles a filter object.
    ///
    /// # Errors
    ///
    /// - [`QueryError::Disallowed`] for `$where`
    /// - [`QueryError::UnknownOperator`] for unsupported operators
    /// - [`QueryError::InvalidArgument`] / [`QueryError::Malformed`] for
    ///   operators given the wrong kind of argument
    pub fn parse(filter: &Map<String, Value>) -> QueryResult<Self> {
        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            clauses.push(match key.as_str() {
                "$and" => Predicate::And(parse_clause_list(key, value)?),
                "$or" => Predicate::Or(parse_clause_list(key, value)?),
                "$nor" => Predicate::Nor(parse_clause_list(key, value)?),
                "$where" => return Err(QueryError::disallowed(key.as_str())),
                // Comments ride along in filters and never affect matching
                "$comment" => continue,
                op if op.starts_with('$') => return Err(QueryError::unknown_operator(op)),
                path => Predicate::Field {
                    path: path.to_string(),
                    conditions: parse_conditions(value)?,
                },
            });
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Predicate::And(clauses)
        })
    }

    /// Returns true if the record satisfies this predicate.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|p| p.matches(record)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(record)),
            Predicate::Nor(children) => !children.iter().any(|p| p.matches(record)),
            Predicate::Field { path, conditions } => {
                let values = resolve_path(record, path);
                conditions.iter().all(|c| c.matches(&values))
            }
        }
    }

    /// Returns true if the value is a document satisfying this predicate.
    pub fn matches_value(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|map| self.matches(map))
    }
}

fn parse_clause_list(op: &str, value: &Value) -> QueryResult<Vec<Predicate>> {
    let Value::Array(items) = value else {
        return Err(QueryError::invalid_argument(op, "expected an array"));
    };
    if items.is_empty() {
        return Err(QueryError::invalid_argument(op, "expected a non-empty array"));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(clause) => Predicate::parse(clause),
            _ => Err(QueryError::invalid_argument(op, "each clause must be an object")),
        })
        .collect()
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    map.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Parses the right-hand side of a field clause.
fn parse_conditions(value: &Value) -> QueryResult<Vec<Condition>> {
    match value {
        Value::Object(map) if is_operator_object(map) => parse_operator_object(map),
        literal => Ok(vec![Condition::Eq(literal.clone())]),
    }
}

fn parse_operator_object(map: &Map<String, Value>) -> QueryResult<Vec<Condition>> {
    if let Some(plain) = map.keys().find(|k| !k.starts_with('$')) {
        return Err(QueryError::malformed(format!(
            "cannot mix operators and field {plain} in one expression"
        )));
    }

    let mut conditions = Vec::with_capacity(map.len());
    for (op, arg) in map {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Cmp(Ordering::Greater, false, arg.clone()),
            "$gte" => Condition::Cmp(Ordering::Greater, true, arg.clone()),
            "$lt" => Condition::Cmp(Ordering::Less, false, arg.clone()),
            "$lte" => Condition::Cmp(Ordering::Less, true, arg.clone()),
            "$in" => Condition::In(expect_array(op, arg)?.clone()),
            "$nin" => Condition::Nin(expect_array(op, arg)?.clone()),
            "$all" => Condition::All(expect_array(op, arg)?.clone()),
            "$exists" => Condition::Exists(is_truthy(arg)),
            "$type" => Condition::Type(parse_types(arg)?),
            "$size" => Condition::Size(
                arg.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| QueryError::invalid_argument(op, "expected a non-negative integer"))?,
            ),
            "$mod" => parse_mod(arg)?,
            "$regex" => Condition::Regex(parse_regex(arg, map.get("$options"))?),
            "$options" if map.contains_key("$regex") => continue,
            "$options" => return Err(QueryError::malformed("$options without $regex")),
            "$elemMatch" => Condition::ElemMatch(Box::new(parse_elem_match(arg)?)),
            "$not" => match arg {
                Value::Object(inner) if is_operator_object(inner) => {
                    Condition::Not(parse_operator_object(inner)?)
                }
                _ => return Err(QueryError::invalid_argument(op, "expected an operator object")),
            },
            "$where" => return Err(QueryError::disallowed(op.as_str())),
            other => return Err(QueryError::unknown_operator(other)),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn expect_array<'a>(op: &str, arg: &'a Value) -> QueryResult<&'a Vec<Value>> {
    arg.as_array()
        .ok_or_else(|| QueryError::invalid_argument(op, "expected an array"))
}

fn parse_types(arg: &Value) -> QueryResult<Vec<u8>> {
    let one = |v: &Value| -> QueryResult<u8> {
        let rank = match v {
            Value::String(name) => match name.as_str() {
                "null" => Some(1),
                "number" | "double" | "int" | "long" | "decimal" => Some(2),
                "string" => Some(3),
                "object" => Some(4),
                "array" => Some(5),
                "bool" => Some(8),
                _ => None,
            },
            Value::Number(code) => match code.as_u64() {
                Some(1 | 16 | 18 | 19) => Some(2),
                Some(2) => Some(3),
                Some(3) => Some(4),
                Some(4) => Some(5),
                Some(8) => Some(8),
                Some(10) => Some(1),
                _ => None,
            },
            _ => None,
        };
        rank.ok_or_else(|| QueryError::invalid_argument("$type", format!("unknown type {v}")))
    };
    match arg {
        Value::Array(items) => items.iter().map(one).collect(),
        single => Ok(vec![one(single)?]),
    }
}

fn parse_mod(arg: &Value) -> QueryResult<Condition> {
    let bad = || QueryError::invalid_argument("$mod", "expected [divisor, remainder]");
    let pair = arg.as_array().ok_or_else(bad)?;
    let [divisor, remainder] = pair.as_slice() else {
        return Err(bad());
    };
    let as_int = |v: &Value| v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64));
    let divisor = as_int(divisor).ok_or_else(bad)?;
    let remainder = as_int(remainder).ok_or_else(bad)?;
    if divisor == 0 {
        return Err(QueryError::invalid_argument("$mod", "divisor cannot be 0"));
    }
    Ok(Condition::Mod(divisor, remainder))
}

fn parse_regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Regex> {
    let Value::String(pattern) = pattern else {
        return Err(QueryError::invalid_argument("$regex", "expected a string pattern"));
    };
    let flags = match options {
        None => String::new(),
        Some(Value::String(flags)) => flags.clone(),
        Some(_) => return Err(QueryError::invalid_argument("$options", "expected a string")),
    };
    if let Some(bad) = flags.chars().find(|c| !"imsx".contains(*c)) {
        return Err(QueryError::invalid_argument(
            "$options",
            format!("unsupported flag {bad}"),
        ));
    }
    let source = if flags.is_empty() {
        pattern.clone()
    } else {
        format!("(?{flags}){pattern}")
    };
    Regex::new(&source).map_err(|e| QueryError::invalid_argument("$regex", e.to_string()))
}

fn parse_elem_match(arg: &Value) -> QueryResult<ElemMatch> {
    let Value::Object(map) = arg else {
        return Err(QueryError::invalid_argument("$elemMatch", "expected an object"));
    };
    let logical = |k: &String| matches!(k.as_str(), "$and" | "$or" | "$nor");
    if is_operator_object(map) && !map.keys().any(logical) {
        Ok(ElemMatch::Value(parse_operator_object(map)?))
    } else {
        Ok(ElemMatch::Document(Predicate::parse(map)?))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// True if `test` holds for a value or, for arrays, any of its elements.
fn any_expanded(values: &[&Value], test: impl Fn(&Value) -> bool) -> bool {
    values.iter().any(|v| {
        test(*v) || matches!(v, Value::Array(items) if items.iter().any(|item| test(item)))
    })
}

fn eq_matches(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    any_expanded(values, |v| values_equal(v, target))
}

impl Condition {
    /// Returns true if the condition holds for the values resolved at a path.
    pub fn matches(&self, values: &[&Value]) -> bool {
        match self {
            Condition::Eq(target) => eq_matches(values, target),
            Condition::Ne(target) => !eq_matches(values, target),
            Condition::Cmp(direction, inclusive, target) => any_expanded(values, |v| {
                if type_rank(v) != type_rank(target) {
                    return false;
                }
                let ordering = compare_values(v, target);
                ordering == *direction || (*inclusive && ordering == Ordering::Equal)
            }),
            Condition::In(targets) => targets.iter().any(|t| eq_matches(values, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| eq_matches(values, t)),
            Condition::Exists(expected) => !values.is_empty() == *expected,
            Condition::Type(ranks) => any_expanded(values, |v| ranks.contains(&type_rank(v))),
            Condition::Size(len) => values
                .iter()
                .any(|v| matches!(v, Value::Array(items) if items.len() == *len)),
            Condition::All(targets) => {
                !targets.is_empty() && targets.iter().all(|t| eq_matches(values, t))
            }
            Condition::ElemMatch(body) => values.iter().any(|v| {
                let Value::Array(items) = v else {
                    return false;
                };
                items.iter().any(|item| match body.as_ref() {
                    ElemMatch::Value(conditions) => conditions.iter().all(|c| c.matches(&[item])),
                    ElemMatch::Document(predicate) => predicate.matches_value(item),
                })
            }),
            Condition::Regex(regex) => {
                any_expanded(values, |v| v.as_str().is_some_and(|s| regex.is_match(s)))
            }
            Condition::Mod(divisor, remainder) => any_expanded(values, |v| {
                let n = v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64));
                n.is_some_and(|n| n.wrapping_rem(*divisor) == *remainder)
            }),
            Condition::Not(conditions) => !conditions.iter().all(|c| c.matches(values)),
        }
    }
}
