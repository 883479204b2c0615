use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counter write conflicted: {0}")]
    Conflict(String),
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out: {0}")]
    Timeout(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("stored counter is invalid: {0}")]
    InvalidData(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

impl StoreError {
    /// Whether the failed operation left no trace and may simply be issued again.
    ///
    /// Contention and connectivity problems are retryable. Query, data and
    /// generic operation failures point at a real downstream fault.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict(_) | StoreError::Unavailable(_) | StoreError::Timeout(_)
        )
    }
}

/// Invalid generation settings, detected before any counter is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("increment must be positive, got {0}")]
    InvalidIncrement(i64),
    #[error("length must be at most {max}, got {length}")]
    InvalidLength { length: usize, max: usize },
    #[error("invalid year format '{format}': {message}")]
    InvalidYearFormat { format: String, message: String },
}
