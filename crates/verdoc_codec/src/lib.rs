//! # VerDoc Codec
//!
//! Snapshot and operation record encoding for VerDoc.
//!
//! This crate provides:
//! - [`Snapshot`] and [`Operation`], the two persisted entities
//! - The mapping between a snapshot and a flat storage [`Record`] that a
//!   predicate engine can match against directly
//! - CBOR byte framing for anything that crosses the key-value backend
//! - Read-time field [`Projection`]
//!
//! ## Record Layout
//!
//! Mapping-typed document data is merged into the record so user fields
//! sit at the top level. Anything else is boxed under `_data`. Bookkeeping
//! lives in reserved, underscore-prefixed fields (see [`fields`]), and the
//! chosen layout is tagged in `_enc`.
//!
//! ```
//! use serde_json::json;
//! use verdoc_codec::{decode_record, encode_snapshot, Snapshot};
//!
//! let snapshot = Snapshot::new("a", 1, Some("text".into()), Some(json!({"title": "hi"})));
//! let record = encode_snapshot("a", &snapshot, None);
//! assert_eq!(record["title"], json!("hi"));
//! assert_eq!(decode_record(&record).unwrap(), snapshot);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod framing;
mod operation;
mod projection;
mod record;
mod snapshot;

pub use error::{CodecError, CodecResult};
pub use framing::{from_bytes, record_from_bytes, record_to_bytes, to_bytes};
pub use operation::{OpId, Operation};
pub use projection::Projection;
pub use record::{decode_record, encode_snapshot, fields, Encoding, Record};
pub use snapshot::Snapshot;

/// Re-export of the JSON value type used for document data.
pub use serde_json::Value;
