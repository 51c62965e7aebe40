//! Snapshot ↔ storage record mapping.

use crate::error::{CodecError, CodecResult};
use crate::operation::OpId;
use crate::snapshot::Snapshot;
use serde_json::{Map, Value};

/// A flat storage record, the shape the predicate engine matches against.
pub type Record = Map<String, Value>;

/// Reserved record field names.
///
/// All reserved names start with an underscore. User data that uses one of
/// these names at the top level is overwritten on encode.
pub mod fields {
    /// Document id.
    pub const ID: &str = "_id";
    /// Document type, `null` for tombstones.
    pub const TYPE: &str = "_type";
    /// Document version.
    pub const VERSION: &str = "_v";
    /// Metadata.
    pub const METADATA: &str = "_m";
    /// Identifier of the producing operation.
    pub const OP_LINK: &str = "_o";
    /// Boxed non-mapping data.
    pub const DATA: &str = "_data";
    /// Layout tag, see [`crate::Encoding`].
    pub const ENCODING: &str = "_enc";

    /// Every reserved name.
    pub const RESERVED: [&str; 7] = [ID, TYPE, VERSION, METADATA, OP_LINK, DATA, ENCODING];

    /// Returns true if `name` is reserved.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }
}

/// How document data is laid out in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Mapping data, fields merged into the record.
    Merged,
    /// Non-mapping data stored under `_data`.
    Boxed,
    /// No data.
    Empty,
}

impl Encoding {
    /// Tag written to `_enc`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Merged => "merged",
            Encoding::Boxed => "boxed",
            Encoding::Empty => "empty",
        }
    }

    /// Parses a tag written by [`Encoding::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "merged" => Some(Encoding::Merged),
            "boxed" => Some(Encoding::Boxed),
            "empty" => Some(Encoding::Empty),
            _ => None,
        }
    }

    /// Chooses the layout for a snapshot.
    pub fn for_snapshot(snapshot: &Snapshot) -> Self {
        if snapshot.doc_type.is_none() {
            return Encoding::Empty;
        }
        match &snapshot.data {
            Some(Value::Object(_)) => Encoding::Merged,
            Some(_) => Encoding::Boxed,
            None => Encoding::Empty,
        }
    }
}

/// Encodes a snapshot as a storage record.
///
/// `id` and `op_link` take precedence over the snapshot's own fields. A
/// tombstone never carries data.
pub fn encode_snapshot(id: &str, snapshot: &Snapshot, op_link: Option<&OpId>) -> Record {
    let encoding = Encoding::for_snapshot(snapshot);
    let mut record = match (encoding, &snapshot.data) {
        (Encoding::Merged, Some(Value::Object(data))) => data.clone(),
        (Encoding::Boxed, Some(data)) => {
            let mut record = Map::new();
            record.insert(fields::DATA.into(), data.clone());
            record
        }
        _ => Map::new(),
    };

    record.insert(fields::ID.into(), Value::String(id.to_string()));
    record.insert(
        fields::TYPE.into(),
        snapshot.doc_type.clone().map_or(Value::Null, Value::String),
    );
    record.insert(fields::VERSION.into(), Value::from(snapshot.version));
    record.insert(
        fields::METADATA.into(),
        snapshot.metadata.clone().unwrap_or(Value::Null),
    );
    record.insert(
        fields::OP_LINK.into(),
        op_link.map_or(Value::Null, |link| Value::String(link.to_string())),
    );
    record.insert(fields::ENCODING.into(), Value::String(encoding.as_str().into()));
    record
}

/// Decodes a storage record back into a snapshot.
///
/// # Errors
///
/// Returns [`CodecError::InvalidRecord`] if a reserved field is missing or
/// has the wrong type.
pub fn decode_record(record: &Record) -> CodecResult<Snapshot> {
    let id = match record.get(fields::ID) {
        Some(Value::String(id)) => id.clone(),
        other => {
            return Err(CodecError::invalid_record(format!(
                "expected string {}, got {other:?}",
                fields::ID
            )))
        }
    };

    let version = record
        .get(fields::VERSION)
        .and_then(Value::as_u64)
        .ok_or_else(|| CodecError::invalid_record(format!("record {id} has no valid version")))?;

    let doc_type = match record.get(fields::TYPE) {
        None | Some(Value::Null) => None,
        Some(Value::String(t)) => Some(t.clone()),
        Some(other) => {
            return Err(CodecError::invalid_record(format!(
                "record {id} has non-string type {other}"
            )))
        }
    };

    let metadata = match record.get(fields::METADATA) {
        None | Some(Value::Null) => None,
        Some(m) => Some(m.clone()),
    };

    let op_link = match record.get(fields::OP_LINK) {
        None | Some(Value::Null) => None,
        Some(Value::String(link)) => Some(link.parse::<OpId>().map_err(|e| {
            CodecError::invalid_record(format!("record {id} has bad operation link: {e}"))
        })?),
        Some(other) => {
            return Err(CodecError::invalid_record(format!(
                "record {id} has non-string operation link {other}"
            )))
        }
    };

    let data = if doc_type.is_none() {
        None
    } else {
        match record_encoding(record)? {
            Encoding::Boxed => Some(record.get(fields::DATA).cloned().unwrap_or(Value::Null)),
            Encoding::Merged => Some(Value::Object(
                record
                    .iter()
                    .filter(|(k, _)| !fields::is_reserved(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
            Encoding::Empty => None,
        }
    };

    Ok(Snapshot {
        id,
        version,
        doc_type,
        data,
        metadata,
        op_link,
    })
}

fn record_encoding(record: &Record) -> CodecResult<Encoding> {
    match record.get(fields::ENCODING) {
        Some(Value::String(tag)) => Encoding::from_tag(tag)
            .ok_or_else(|| CodecError::invalid_record(format!("unknown encoding tag {tag}"))),
        Some(other) => Err(CodecError::invalid_record(format!(
            "non-string encoding tag {other}"
        ))),
        // Untagged records predate `_enc`
        None if record.contains_key(fields::DATA) => Ok(Encoding::Boxed),
        None => Ok(Encoding::Merged),
    }
}
