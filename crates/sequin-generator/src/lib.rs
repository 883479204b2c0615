//! Formatted, collision-free sequence generation.
//!
//! [`SequenceGenerator`] resolves generation options, allocates the next value
//! from a [`SequenceStore`](sequin_core::SequenceStore) with bounded retries and
//! formats it. [`SequenceField`] wires the generator into a record's
//! validation lifecycle.

pub mod error;
pub mod field;
pub mod generator;
pub mod retry;

pub use error::GenerateError;
pub use field::{FieldError, FieldOutcome, SequenceField, ValidationFailure, SEQUENCE_PLACEHOLDER};
pub use generator::{Generated, SequenceGenerator};
pub use retry::RetryPolicy;
