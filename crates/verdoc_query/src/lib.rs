//! # VerDoc Query
//!
//! Mongo-style query normalization and evaluation for VerDoc.
//!
//! This crate provides:
//! - [`normalize`], which splits a caller's query object into a filter,
//!   meta-operators and cursor directives
//! - [`Predicate`], a compiled filter that matches storage records
//! - [`Cursor`], which applies sort, skip and limit in that order
//! - [`Pipeline`], a small aggregation pipeline
//!
//! Everything is parsed once at the boundary: malformed or disallowed
//! queries fail in [`normalize`] before a single record is looked at.
//!
//! ```
//! use serde_json::json;
//! use verdoc_query::{normalize, QueryMode};
//!
//! let query = normalize(&json!({"score": {"$gt": 4}, "$orderby": {"score": -1}, "$limit": 1})).unwrap();
//! assert!(matches!(query.mode, QueryMode::Find));
//! assert_eq!(query.cursor.len(), 2);
//!
//! let record = json!({"_id": "d", "_type": "t", "score": 7});
//! assert!(query.predicate.matches(record.as_object().unwrap()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod aggregate;
mod compare;
mod cursor;
mod error;
mod normalize;
mod predicate;

pub use aggregate::{Accumulator, Expr, Pipeline, ProjectSpec, Stage};
pub use compare::{compare_values, resolve_path, values_equal};
pub use cursor::{Cursor, SortDirection, SortSpec};
pub use error::{QueryError, QueryResult};
pub use normalize::{normalize, CursorOp, MetaOperator, NormalizedQuery, QueryMode};
pub use predicate::{Condition, ElemMatch, Predicate};
