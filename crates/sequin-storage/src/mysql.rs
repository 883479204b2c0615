use async_trait::async_trait;
use sequin_core::error::{Result, StoreError};
use sequin_core::store::{initial_base, DEFAULT_START_VALUE};
use sequin_core::{Counter, CounterKey, SequenceStore};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{MySqlPool, Row};
use tracing::{debug, trace, warn};

/// DDL for the counter table.
pub const SCHEMA: &str = include_str!("../ddl/mysql/sequence_counters.sql");

const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

/// MySQL implementation of the [`SequenceStore`] contract.
///
/// Each allocation is an upsert on the `(namespace, prefix, suffix)` unique key
/// followed by a read of the row inside one transaction; InnoDB holds the row
/// lock until commit, so no two allocations observe the same value. An absent
/// suffix is persisted as `''`.
#[derive(Debug, Clone)]
pub struct MySqlSequenceStore {
    pool: MySqlPool,
    base: i64,
}

impl MySqlSequenceStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            base: initial_base(DEFAULT_START_VALUE),
        }
    }

    /// Sets the value issued by the first allocation of a fresh key.
    pub fn with_start_value(mut self, start_value: i64) -> Self {
        self.base = initial_base(start_value);
        self
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the counter table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn suffix_column(key: &CounterKey) -> &str {
    key.suffix().unwrap_or_default()
}

fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    err.as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(MySqlDatabaseError::number)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();

    if is_unique_violation(&err)
        || matches!(
            mysql_error_number(&err),
            Some(ER_LOCK_DEADLOCK | ER_LOCK_WAIT_TIMEOUT)
        )
    {
        return StoreError::Conflict(message);
    }

    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StoreError::InvalidData(message),
        _ => StoreError::Query(message),
    }
}

#[async_trait]
impl SequenceStore for MySqlSequenceStore {
    async fn allocate(&self, key: &CounterKey, increment: i64) -> Result<Counter> {
        // Dropping the transaction on any error rolls the upsert back.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO sequence_counters (namespace, prefix, suffix, sequence)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE sequence = sequence + ?
            "#,
        )
        .bind(key.namespace())
        .bind(key.prefix())
        .bind(suffix_column(key))
        .bind(self.base + increment)
        .bind(increment)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            let err = map_sqlx_error(err);
            if err.is_retryable() {
                debug!(key = %key, error = %err, "counter upsert conflicted");
            } else {
                warn!(key = %key, error = %err, "counter upsert failed");
            }
            err
        })?;

        let row = sqlx::query(
            r#"
            SELECT sequence
            FROM sequence_counters
            WHERE namespace = ? AND prefix = ? AND suffix = ?
            "#,
        )
        .bind(key.namespace())
        .bind(key.prefix())
        .bind(suffix_column(key))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let sequence: i64 = row.try_get("sequence").map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        trace!(key = %key, sequence, "allocated MySQL sequence");
        Ok(Counter::new(key, sequence))
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<Counter>> {
        let row = sqlx::query(
            r#"
            SELECT sequence
            FROM sequence_counters
            WHERE namespace = ? AND prefix = ? AND suffix = ?
            LIMIT 1
            "#,
        )
        .bind(key.namespace())
        .bind(key.prefix())
        .bind(suffix_column(key))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sequence: i64 = row.try_get("sequence").map_err(map_sqlx_error)?;
        Ok(Some(Counter::new(key, sequence)))
    }

    async fn reset(&self, key: &CounterKey, sequence: i64) -> Result<Counter> {
        sqlx::query(
            r#"
            INSERT INTO sequence_counters (namespace, prefix, suffix, sequence)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE sequence = ?
            "#,
        )
        .bind(key.namespace())
        .bind(key.prefix())
        .bind(suffix_column(key))
        .bind(sequence)
        .bind(sequence)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(key = %key, sequence, "reset MySQL sequence");
        Ok(Counter::new(key, sequence))
    }
}
