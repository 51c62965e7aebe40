//! Read-time field projection.

use crate::snapshot::Snapshot;
use serde_json::Value;
use std::collections::BTreeSet;

/// A set of top-level data fields to keep when reading documents.
///
/// Projection is applied after decoding. It only narrows mapping-typed
/// data; scalar data, the type, the version and the metadata are always
/// returned in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: BTreeSet<String>,
}

impl Projection {
    /// Creates a projection keeping the given fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a projection from its wire form.
    ///
    /// Accepts either an array of field names or an object whose keys are
    /// field names with a truthy value (`{"title": true, "body": 1}`).
    /// Returns `None` for any other shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<_>>>()
                .map(|fields| Self { fields }),
            Value::Object(map) => Some(Self {
                fields: map
                    .iter()
                    .filter(|(_, v)| is_truthy(v))
                    .map(|(k, _)| k.clone())
                    .collect(),
            }),
            _ => None,
        }
    }

    /// Returns true if `field` is kept.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Returns the kept field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Narrows a snapshot's data to the projected fields.
    #[must_use]
    pub fn apply(&self, mut snapshot: Snapshot) -> Snapshot {
        if let Some(Value::Object(data)) = snapshot.data.as_mut() {
            data.retain(|k, _| self.fields.contains(k));
        }
        snapshot
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
