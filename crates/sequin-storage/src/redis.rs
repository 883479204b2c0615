use async_trait::async_trait;
use redis::AsyncCommands;
use sequin_core::error::{Result, StoreError};
use sequin_core::store::{initial_base, DEFAULT_START_VALUE};
use sequin_core::{Counter, CounterKey, SequenceStore};
use tracing::{debug, trace, warn};

/// Seeds a missing hash with the base value and increments it in one step.
///
/// KEYS[1] counter hash; ARGV: increment, base, namespace, prefix, suffix.
const ALLOCATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  redis.call('HSET', KEYS[1], 'namespace', ARGV[3], 'prefix', ARGV[4], 'suffix', ARGV[5], 'sequence', ARGV[2])
end
return redis.call('HINCRBY', KEYS[1], 'sequence', ARGV[1])
"#;

/// A Redis-based implementation of [`SequenceStore`].
///
/// Every counter is a hash holding `namespace`, `prefix`, `suffix` and
/// `sequence`. Allocation runs as a Lua script, which Redis executes
/// atomically, so the create-or-increment never interleaves with other writers.
#[derive(Debug, Clone)]
pub struct RedisSequenceStore {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
    base: i64,
    allocate: redis::Script,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> StoreError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        StoreError::Timeout(message)
    } else if err.is_io_error() || err.is_connection_dropped() {
        StoreError::Unavailable(message)
    } else {
        StoreError::Operation(message)
    }
}

impl RedisSequenceStore {
    /// Creates a new Redis sequence store.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, "sequin:counter:")
    }

    /// Creates a new Redis sequence store with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for counter keys (e.g., "myapp:seq:")
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            base: initial_base(DEFAULT_START_VALUE),
            allocate: redis::Script::new(ALLOCATE_SCRIPT),
        }
    }

    /// Sets the value issued by the first allocation of a fresh key.
    pub fn with_start_value(mut self, start_value: i64) -> Self {
        self.base = initial_base(start_value);
        self
    }

    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| map_redis_error("invalid Redis URL", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(conn))
    }

    /// Generates the Redis key for a counter.
    ///
    /// The key parts are JSON-encoded so separators inside them cannot make two
    /// different keys collide.
    fn counter_key(&self, key: &CounterKey) -> String {
        let parts = serde_json::json!([
            key.namespace(),
            key.prefix(),
            key.suffix().unwrap_or_default()
        ]);
        format!("{}{}", self.key_prefix, parts)
    }
}

#[async_trait]
impl SequenceStore for RedisSequenceStore {
    async fn allocate(&self, key: &CounterKey, increment: i64) -> Result<Counter> {
        let redis_key = self.counter_key(key);
        trace!(key = %key, "allocating sequence in Redis");

        let mut conn = self.conn.clone();
        let sequence: i64 = self
            .allocate
            .key(&redis_key)
            .arg(increment)
            .arg(self.base)
            .arg(key.namespace())
            .arg(key.prefix())
            .arg(key.suffix().unwrap_or_default())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis allocation failed");
                map_redis_error("failed to allocate sequence in Redis", e)
            })?;

        trace!(key = %key, sequence, "allocated Redis sequence");
        Ok(Counter::new(key, sequence))
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<Counter>> {
        let redis_key = self.counter_key(key);

        let mut conn = self.conn.clone();
        let sequence = conn
            .hget::<_, _, Option<i64>>(&redis_key, "sequence")
            .await
            .map_err(|e| map_redis_error("failed to read sequence from Redis", e))?;

        Ok(sequence.map(|sequence| Counter::new(key, sequence)))
    }

    async fn reset(&self, key: &CounterKey, sequence: i64) -> Result<Counter> {
        let redis_key = self.counter_key(key);
        let sequence_value = sequence.to_string();
        let fields = [
            ("namespace", key.namespace()),
            ("prefix", key.prefix()),
            ("suffix", key.suffix().unwrap_or_default()),
            ("sequence", sequence_value.as_str()),
        ];

        let mut conn = self.conn.clone();
        conn.hset_multiple::<_, _, _, ()>(&redis_key, &fields)
            .await
            .map_err(|e| map_redis_error("failed to reset sequence in Redis", e))?;

        debug!(key = %key, sequence, "reset Redis sequence");
        Ok(Counter::new(key, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_disconnects_are_retryable() {
        let io = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        let err = map_redis_error("allocate", io);
        assert!(err.is_retryable());
    }

    #[test]
    fn timeouts_are_classified_by_error_kind() {
        let timed_out = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read",
        ));
        assert!(matches!(
            map_redis_error("allocate", timed_out),
            StoreError::Timeout(_)
        ));

        // wording alone does not make a timeout
        let reset = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer went away after the handshake timed out",
        ));
        assert!(matches!(
            map_redis_error("allocate", reset),
            StoreError::Unavailable(_)
        ));
    }
}
