//! Core types and traits for the Sequin sequence generator.
//!
//! This crate provides the counter model, the storage contract and the
//! option/formatting rules shared by the store backends and the generator.

pub mod clock;
pub mod counter;
pub mod error;
pub mod format;
pub mod options;
pub mod record;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use counter::{Counter, CounterKey};
pub use error::{ConfigError, StoreError};
pub use format::{FormatContext, Formatter};
pub use options::{GenerationOptions, GeneratorDefaults, Resolvable, ResolvedOptions};
pub use record::{Record, RecordMut, RecordView};
pub use store::SequenceStore;
