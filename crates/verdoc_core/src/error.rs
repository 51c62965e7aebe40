//! Error types for VerDoc core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in VerDoc core operations.
///
/// A commit losing the version race is not an error; it returns `Ok(false)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend failure, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] verdoc_storage::StorageError),

    /// Record or operation could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] verdoc_codec::CodecError),

    /// Query could not be normalized or compiled.
    #[error("query error: {0}")]
    Query(#[from] verdoc_query::QueryError),

    /// Operation rejected before any write.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// `close` was called on a database that is already closed.
    #[error("database already closed")]
    AlreadyClosed,
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by a malformed operation.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Self::InvalidOperation { .. } => true,
            Self::Codec(e) => e.is_validation_error(),
            _ => false,
        }
    }

    /// Returns true for malformed or disallowed queries.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns true for backend failures.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdoc_codec::CodecError;
    use verdoc_query::QueryError;
    use verdoc_storage::StorageError;

    #[test]
    fn classification() {
        assert!(CoreError::invalid_operation("bad").is_validation_error());
        assert!(CoreError::from(CodecError::invalid_operation("v")).is_validation_error());
        assert!(!CoreError::from(CodecError::decoding("x")).is_validation_error());
        assert!(CoreError::from(QueryError::disallowed("$where")).is_query_error());
        assert!(CoreError::from(StorageError::corrupted("x")).is_storage_error());
        assert!(!CoreError::DatabaseClosed.is_storage_error());
    }

    #[test]
    fn display() {
        let err = CoreError::from(QueryError::disallowed("$where"));
        assert_eq!(err.to_string(), "query error: illegal $where query");
    }
}
