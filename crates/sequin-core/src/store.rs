use crate::counter::{Counter, CounterKey};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Value of the first counter issued for a fresh key under the default increment.
pub const DEFAULT_START_VALUE: i64 = 1;

/// Implicit value a counter holds before its first allocation.
///
/// The first allocation for a fresh key yields `base + increment`, so with the
/// default start value an `increment` of 10 issues 10 rather than 11.
/// `i64::MIN` saturates.
pub fn initial_base(start_value: i64) -> i64 {
    start_value.saturating_sub(1)
}

/// Durable, race-safe storage of counter rows.
///
/// Every mutation is a single atomic operation on the backing store. Callers
/// never read a counter and write it back themselves.
#[async_trait]
pub trait SequenceStore: Send + Sync + 'static {
    /// Atomically creates-or-increments the counter for `key` and returns the
    /// post-increment row.
    ///
    /// The increment is applied exactly once per successful call. A failed call
    /// leaves the counter untouched; retryable failures are reported through
    /// [`StoreError::is_retryable`](crate::StoreError::is_retryable).
    async fn allocate(&self, key: &CounterKey, increment: i64) -> Result<Counter>;

    /// Returns the latest allocated value without mutating it.
    /// Returns `None` if nothing was ever allocated for `key`.
    async fn current(&self, key: &CounterKey) -> Result<Option<Counter>>;

    /// Atomically overwrites (or creates) the counter for `key`.
    ///
    /// The next allocation continues from `sequence`.
    async fn reset(&self, key: &CounterKey, sequence: i64) -> Result<Counter>;
}

#[async_trait]
impl<S: SequenceStore + ?Sized> SequenceStore for Arc<S> {
    async fn allocate(&self, key: &CounterKey, increment: i64) -> Result<Counter> {
        (**self).allocate(key, increment).await
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<Counter>> {
        (**self).current(key).await
    }

    async fn reset(&self, key: &CounterKey, sequence: i64) -> Result<Counter> {
        (**self).reset(key, sequence).await
    }
}
