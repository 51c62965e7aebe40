//! Error types for query processing.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while normalizing or compiling a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query object has the wrong shape.
    #[error("malformed query: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// The query uses an operator that is never executed.
    #[error("illegal {operator} query")]
    Disallowed {
        /// The offending operator.
        operator: String,
    },

    /// The query uses an operator this engine does not know.
    #[error("unknown operator: {operator}")]
    UnknownOperator {
        /// The unknown operator.
        operator: String,
    },

    /// An operator was given an argument of the wrong type or range.
    #[error("invalid argument to {operator}: {message}")]
    InvalidArgument {
        /// The operator.
        operator: String,
        /// Description of the problem.
        message: String,
    },
}

impl QueryError {
    /// Creates a malformed query error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a disallowed operator error.
    pub fn disallowed(operator: impl Into<String>) -> Self {
        Self::Disallowed {
            operator: operator.into(),
        }
    }

    /// Creates an unknown operator error.
    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        Self::UnknownOperator {
            operator: operator.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operator: operator.into(),
            message: message.into(),
        }
    }
}
