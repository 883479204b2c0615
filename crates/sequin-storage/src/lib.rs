pub mod memory;
pub mod mysql;
pub mod redis;

pub use memory::InMemorySequenceStore;
pub use mysql::MySqlSequenceStore;
pub use self::redis::RedisSequenceStore;
pub use sequin_core::{Counter, CounterKey, SequenceStore, StoreError};
