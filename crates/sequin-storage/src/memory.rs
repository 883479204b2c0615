use async_trait::async_trait;
use dashmap::DashMap;
use sequin_core::error::{Result, StoreError};
use sequin_core::store::{initial_base, DEFAULT_START_VALUE};
use sequin_core::{Counter, CounterKey, SequenceStore};
use tracing::trace;

/// In-memory implementation of [`SequenceStore`] using DashMap.
///
/// Each allocation runs under the shard lock of its key, so increments for the
/// same key are serialised while different keys proceed in parallel.
#[derive(Debug)]
pub struct InMemorySequenceStore {
    counters: DashMap<CounterKey, i64>,
    base: i64,
}

impl InMemorySequenceStore {
    /// Creates a new in-memory store whose fresh counters start at 1.
    pub fn new() -> Self {
        Self::with_start_value(DEFAULT_START_VALUE)
    }

    /// Creates a new in-memory store whose fresh counters start at `start_value`.
    pub fn with_start_value(start_value: i64) -> Self {
        Self {
            counters: DashMap::new(),
            base: initial_base(start_value),
        }
    }

    /// Number of distinct keys allocated so far.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Default for InMemorySequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn allocate(&self, key: &CounterKey, increment: i64) -> Result<Counter> {
        let mut entry = self.counters.entry(key.clone()).or_insert(self.base);
        let next = entry.checked_add(increment).ok_or_else(|| {
            StoreError::Operation(format!("sequence overflow for counter {key}"))
        })?;
        *entry = next;
        drop(entry);

        trace!(key = %key, sequence = next, "allocated in-memory sequence");
        Ok(Counter::new(key, next))
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<Counter>> {
        Ok(self
            .counters
            .get(key)
            .map(|sequence| Counter::new(key, *sequence)))
    }

    async fn reset(&self, key: &CounterKey, sequence: i64) -> Result<Counter> {
        self.counters.insert(key.clone(), sequence);
        trace!(key = %key, sequence, "reset in-memory sequence");
        Ok(Counter::new(key, sequence))
    }
}
