//! Retry budget for conflicting counter allocations.

use backon::ExponentialBuilder;
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff with jitter between allocation attempts.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RetryPolicy {
    /// Total allocation attempts, including the first one.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[builder(default = DEFAULT_MIN_DELAY)]
    pub min_delay: Duration,
    /// Upper bound for a single delay.
    #[builder(default = DEFAULT_MAX_DELAY)]
    pub max_delay: Duration,
    /// Give up once this much time has passed since the first attempt.
    #[builder(default, setter(strip_option))]
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::builder().max_attempts(1).build()
    }

    /// Creates an exponential backoff builder with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }
}
