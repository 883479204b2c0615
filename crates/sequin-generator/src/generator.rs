use crate::error::{GenerateError, Result};
use crate::retry::RetryPolicy;
use backon::BackoffBuilder;
use sequin_core::{
    Clock, Counter, GenerationOptions, GeneratorDefaults, RecordView, ResolvedOptions,
    SequenceStore, SystemClock,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A freshly issued sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// The formatted display string, e.g. `TZ210001`.
    pub value: String,
    /// Counter snapshot right after the allocation.
    pub counter: Counter,
}

/// Issues formatted sequence values backed by a [`SequenceStore`].
///
/// The generator holds no lock of its own: the store's atomic allocation is
/// the only serialisation point, so any number of tasks may share one
/// generator. Retryable store failures are retried with exponential backoff
/// according to the [`RetryPolicy`]; only terminal outcomes are returned.
#[derive(Debug)]
pub struct SequenceGenerator<S, C = SystemClock> {
    store: S,
    defaults: GeneratorDefaults,
    retry: RetryPolicy,
    clock: C,
}

impl<S: SequenceStore> SequenceGenerator<S> {
    /// Creates a generator with default options, retry policy and the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            defaults: GeneratorDefaults::default(),
            retry: RetryPolicy::default(),
            clock: SystemClock,
        }
    }
}

impl<S: SequenceStore, C: Clock> SequenceGenerator<S, C> {
    pub fn with_defaults(mut self, defaults: GeneratorDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the clock used for date prefixes and formatter timestamps.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SequenceGenerator<S, C2> {
        SequenceGenerator {
            store: self.store,
            defaults: self.defaults,
            retry: self.retry,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn defaults(&self) -> &GeneratorDefaults {
        &self.defaults
    }

    /// Resolves `options` against `record` and the configured defaults.
    pub fn resolve(
        &self,
        options: &GenerationOptions,
        record: &dyn RecordView,
    ) -> Result<ResolvedOptions> {
        let now = self.clock.now();
        Ok(options.resolve(&self.defaults, record, &now)?)
    }

    /// Allocates the next sequence for `options` and formats it.
    pub async fn generate(
        &self,
        options: &GenerationOptions,
        record: &dyn RecordView,
    ) -> Result<Generated> {
        let resolved = self.resolve(options, record)?;
        self.issue(&resolved, None).await
    }

    /// Like [`generate`](Self::generate), but stops retrying once `cancel` fires.
    pub async fn generate_with_cancel(
        &self,
        options: &GenerationOptions,
        record: &dyn RecordView,
        cancel: CancellationToken,
    ) -> Result<Generated> {
        let resolved = self.resolve(options, record)?;
        self.issue(&resolved, Some(&cancel)).await
    }

    /// Allocates and formats a sequence for already resolved options.
    pub async fn issue(
        &self,
        resolved: &ResolvedOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Generated> {
        let counter = self.allocate_with_retry(resolved, cancel).await?;
        let value = resolved.format(&counter, self.clock.now().timestamp());

        debug!(
            key = %resolved.key,
            sequence = counter.sequence,
            value = %value,
            "issued sequence"
        );
        Ok(Generated { value, counter })
    }

    /// Cancellation and the deadline are checked between attempts only, so an
    /// allocation that reached the store is never abandoned halfway.
    async fn allocate_with_retry(
        &self,
        resolved: &ResolvedOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Counter> {
        let key = &resolved.key;
        let started = Instant::now();
        let mut delays = self.retry.backoff().build();
        let mut attempts = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(GenerateError::Cancelled { attempts });
            }

            attempts += 1;
            let last = match self.store.allocate(key, resolved.increment).await {
                Ok(counter) => {
                    if attempts > 1 {
                        debug!(key = %key, attempts, "counter allocation succeeded after retrying");
                    }
                    return Ok(counter);
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => {
                    warn!(key = %key, error = %err, "counter allocation failed");
                    return Err(GenerateError::Store(err));
                }
            };

            let Some(delay) = delays.next() else {
                warn!(key = %key, attempts, error = %last, "counter allocation retries exhausted");
                return Err(GenerateError::RetriesExhausted { attempts, last });
            };

            let elapsed = started.elapsed();
            if self
                .retry
                .deadline
                .is_some_and(|deadline| elapsed + delay > deadline)
            {
                warn!(key = %key, attempts, elapsed = ?elapsed, "counter allocation deadline exceeded");
                return Err(GenerateError::Timeout {
                    elapsed,
                    attempts,
                    last,
                });
            }

            debug!(
                key = %key,
                attempt = attempts,
                retry_in = ?delay,
                error = %last,
                "counter allocation conflicted, retrying"
            );
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(GenerateError::Cancelled { attempts }),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jiff::civil::date;
    use jiff::tz::TimeZone;
    use sequin_core::{ConfigError, CounterKey, FixedClock, Formatter, Record, StoreError};
    use sequin_storage::InMemorySequenceStore;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails the first `failures` allocations with `error`, then delegates.
    struct FlakyStore {
        inner: InMemorySequenceStore,
        failures: AtomicU32,
        calls: AtomicU32,
        error: StoreError,
    }

    impl FlakyStore {
        fn new(failures: u32, error: StoreError) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemorySequenceStore::new(),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                error,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SequenceStore for FlakyStore {
        async fn allocate(
            &self,
            key: &CounterKey,
            increment: i64,
        ) -> sequin_core::error::Result<Counter> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(self.error.clone());
            }
            self.inner.allocate(key, increment).await
        }

        async fn current(&self, key: &CounterKey) -> sequin_core::error::Result<Option<Counter>> {
            self.inner.current(key).await
        }

        async fn reset(
            &self,
            key: &CounterKey,
            sequence: i64,
        ) -> sequin_core::error::Result<Counter> {
            self.inner.reset(key, sequence).await
        }
    }

    fn clock() -> FixedClock {
        FixedClock::new(
            date(2021, 11, 5)
                .at(8, 30, 0, 0)
                .to_zoned(TimeZone::UTC)
                .unwrap(),
        )
    }

    fn generator<S: SequenceStore>(store: S) -> SequenceGenerator<S, FixedClock> {
        SequenceGenerator::new(store)
            .with_clock(clock())
            .with_retry_policy(
                RetryPolicy::builder()
                    .min_delay(Duration::from_millis(1))
                    .max_delay(Duration::from_millis(5))
                    .build(),
            )
    }

    fn vip() -> GenerationOptions {
        GenerationOptions::builder().prefix("VIP").build()
    }

    #[tokio::test]
    async fn default_options_use_year_prefix_and_record_type() {
        let generator = generator(InMemorySequenceStore::new());
        let record = Record::of_type("Ticket");

        let first = generator
            .generate(&GenerationOptions::default(), &record)
            .await
            .unwrap();

        assert_eq!(first.value, "210001");
        assert_eq!(first.counter.namespace, "Ticket");
        assert_eq!(first.counter.prefix, "21");
        assert_eq!(first.counter.sequence, 1);
    }

    #[tokio::test]
    async fn formats_with_literal_prefix() {
        let generator = generator(InMemorySequenceStore::new());

        let first = generator.generate(&vip(), &Record::new()).await.unwrap();
        let second = generator.generate(&vip(), &Record::new()).await.unwrap();

        assert_eq!(first.value, "VIP0001");
        assert_eq!(second.value, "VIP0002");
    }

    #[tokio::test]
    async fn custom_increment_applies_to_fresh_key() {
        let generator = generator(InMemorySequenceStore::new());
        let options = GenerationOptions::builder()
            .prefix("VIP")
            .increment(10)
            .build();

        let generated = generator.generate(&options, &Record::new()).await.unwrap();

        assert_eq!(generated.counter.sequence, 10);
        assert_eq!(generated.value, "VIP0010");
    }

    #[tokio::test]
    async fn custom_pad_and_length() {
        let generator = generator(InMemorySequenceStore::new());
        let options = GenerationOptions::builder()
            .prefix("")
            .length(10)
            .pad('x')
            .build();

        let generated = generator.generate(&options, &Record::new()).await.unwrap();

        assert_eq!(generated.value.len(), 10);
        assert!(generated.value.ends_with('1'));
        assert!(!generated.value.contains('0'));
        assert_eq!(generated.value, "xxxxxxxxx1");
    }

    #[tokio::test]
    async fn custom_formatter_receives_counter_and_timestamp() {
        let generator = generator(InMemorySequenceStore::new());
        let options = GenerationOptions::builder()
            .prefix("TZ")
            .suffix("EU")
            .format(Formatter::new(|ctx| {
                format!(
                    "{}/{}/{}/{}",
                    ctx.prefix,
                    ctx.suffix.as_deref().unwrap_or_default(),
                    ctx.sequence,
                    ctx.timestamp.strftime("%Y%m%d")
                )
            }))
            .build();

        let generated = generator.generate(&options, &Record::new()).await.unwrap();
        assert_eq!(generated.value, "TZ/EU/1/20211105");
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let generator = generator(InMemorySequenceStore::new());
        let eu = GenerationOptions::builder().prefix("VIP").suffix("EU").build();

        generator.generate(&vip(), &Record::new()).await.unwrap();
        generator.generate(&vip(), &Record::new()).await.unwrap();
        let other = generator.generate(&eu, &Record::new()).await.unwrap();

        assert_eq!(other.value, "VIP0001EU");
        let untouched = generator
            .store()
            .current(&CounterKey::new("default", "VIP"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.sequence, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_generation_is_unique_and_gap_free() {
        let generator = Arc::new(generator(InMemorySequenceStore::new()));
        let mut handles = vec![];

        for _ in 0..100 {
            let generator = Arc::clone(&generator);
            handles.push(tokio::spawn(async move {
                generator.generate(&vip(), &Record::new()).await.unwrap()
            }));
        }

        let mut values = HashSet::new();
        let mut sequences = HashSet::new();
        for handle in handles {
            let generated = handle.await.unwrap();
            assert!(values.insert(generated.value));
            sequences.insert(generated.counter.sequence);
        }
        assert_eq!(sequences, (1..=100).collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn conflicts_are_retried_invisibly() {
        let store = FlakyStore::new(3, StoreError::Conflict("duplicate key".into()));
        let generator = generator(Arc::clone(&store));

        let generated = generator.generate(&vip(), &Record::new()).await.unwrap();

        assert_eq!(generated.value, "VIP0001");
        assert_eq!(store.calls(), 4);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_conflict() {
        let store = FlakyStore::new(u32::MAX, StoreError::Conflict("write conflict".into()));
        let generator = generator(Arc::clone(&store)).with_retry_policy(
            RetryPolicy::builder()
                .max_attempts(3)
                .min_delay(Duration::from_millis(1))
                .build(),
        );

        let err = generator.generate(&vip(), &Record::new()).await.unwrap_err();

        assert!(matches!(
            err,
            GenerateError::RetriesExhausted {
                attempts: 3,
                last: StoreError::Conflict(_)
            }
        ));
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn genuine_failures_are_not_retried() {
        let store = FlakyStore::new(1, StoreError::Query("syntax error".into()));
        let generator = generator(Arc::clone(&store));

        let err = generator.generate(&vip(), &Record::new()).await.unwrap_err();

        assert!(matches!(err, GenerateError::Store(StoreError::Query(_))));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_retrying() {
        let store = FlakyStore::new(u32::MAX, StoreError::Unavailable("down".into()));
        let generator = generator(Arc::clone(&store)).with_retry_policy(
            RetryPolicy::builder()
                .max_attempts(1_000)
                .min_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(10))
                .deadline(Duration::from_millis(100))
                .build(),
        );

        let err = generator.generate(&vip(), &Record::new()).await.unwrap_err();

        let GenerateError::Timeout {
            elapsed, attempts, ..
        } = err
        else {
            panic!("expected timeout, got {err:?}");
        };
        assert!(elapsed <= Duration::from_millis(100));
        assert!(attempts > 1);
        assert!(attempts < 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let store = FlakyStore::new(u32::MAX, StoreError::Conflict("busy".into()));
        let generator = generator(Arc::clone(&store)).with_retry_policy(
            RetryPolicy::builder()
                .max_attempts(u32::MAX)
                .min_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(10))
                .build(),
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            canceller.cancel();
        });

        let err = generator
            .generate_with_cancel(&vip(), &Record::new(), token)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::Cancelled { attempts } if attempts >= 1));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_allocation() {
        let store = FlakyStore::new(0, StoreError::Conflict("unused".into()));
        let generator = generator(Arc::clone(&store));
        let token = CancellationToken::new();
        token.cancel();

        let err = generator
            .generate_with_cancel(&vip(), &Record::new(), token)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::Cancelled { attempts: 0 }));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn configuration_errors_fail_before_allocation() {
        let store = FlakyStore::new(0, StoreError::Conflict("unused".into()));
        let generator = generator(Arc::clone(&store));
        let options = GenerationOptions::builder().increment(-1).build();

        let err = generator.generate(&options, &Record::new()).await.unwrap_err();

        assert!(matches!(
            err,
            GenerateError::Configuration(ConfigError::InvalidIncrement(-1))
        ));
        assert_eq!(store.calls(), 0);
    }
}
