//! Database configuration.

/// Default store-wide partition prefix.
pub const DEFAULT_KEY_PREFIX: &str = "verdoc";

/// Configuration for a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix of every partition key, so several databases can share one
    /// backend.
    pub key_prefix: String,

    /// Whether `$aggregate` queries are executed.
    pub allow_aggregate_queries: bool,

    /// Hard cap on find results, applied after the query's own `$limit`.
    pub max_query_results: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            allow_aggregate_queries: true,
            max_query_results: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the partition key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets whether aggregate queries are allowed.
    #[must_use]
    pub const fn allow_aggregate_queries(mut self, value: bool) -> Self {
        self.allow_aggregate_queries = value;
        self
    }

    /// Sets the maximum number of find results.
    #[must_use]
    pub const fn max_query_results(mut self, limit: Option<usize>) -> Self {
        self.max_query_results = limit;
        self
    }
}
