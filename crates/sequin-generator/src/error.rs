use sequin_core::{ConfigError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Result type for generation.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// Terminal outcomes of a generation call. Retryable store conflicts never
/// appear here unless the retry budget ran out.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("invalid generation settings: {0}")]
    Configuration(#[from] ConfigError),
    #[error("counter allocation still conflicting after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: StoreError },
    #[error("counter allocation timed out after {elapsed:?} ({attempts} attempts): {last}")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last: StoreError,
    },
    #[error("counter allocation cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    #[error("counter store failed: {0}")]
    Store(StoreError),
}
