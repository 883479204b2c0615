//! Sequence-backed record fields.
//!
//! A record framework calls [`SequenceField::before_validate`] while validating
//! a record. The hook assigns a freshly generated value to the field unless it
//! already holds one, and reports problems as field-level validation failures.

use crate::error::GenerateError;
use crate::generator::{Generated, SequenceGenerator};
use sequin_core::{Clock, ConfigError, GenerationOptions, RecordMut, RecordView, SequenceStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// Marks a field whose sequence has not been generated yet.
pub const SEQUENCE_PLACEHOLDER: &str = "<sequence:pending>";

pub const EMPTY_SEQUENCE_TEMPLATE: &str =
    "sequence for path `{PATH}` is empty after generation (got `{VALUE}`)";
pub const GENERATION_FAILED_TEMPLATE: &str =
    "sequence for path `{PATH}` could not be generated (got `{VALUE}`): {REASON}";

/// A recoverable, user-visible field validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct ValidationFailure {
    pub path: String,
    pub value: String,
    pub reason: Option<String>,
    template: &'static str,
}

impl ValidationFailure {
    fn empty(path: &str, value: &str) -> Self {
        Self {
            path: path.to_owned(),
            value: value.to_owned(),
            reason: None,
            template: EMPTY_SEQUENCE_TEMPLATE,
        }
    }

    fn generation_failed(path: &str, value: &str, err: &GenerateError) -> Self {
        Self {
            path: path.to_owned(),
            value: value.to_owned(),
            reason: Some(err.to_string()),
            template: GENERATION_FAILED_TEMPLATE,
        }
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Renders the template with the offending path, value and reason.
    pub fn message(&self) -> String {
        self.template
            .replace("{PATH}", &self.path)
            .replace("{VALUE}", &self.value)
            .replace("{REASON}", self.reason.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FieldError {
    /// The field could not be given a valid sequence.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// The field's generation settings are unusable.
    #[error("sequence field `{path}` is misconfigured: {source}")]
    Configuration { path: String, source: ConfigError },
}

/// What [`SequenceField::before_validate`] did to the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The field already held a sequence and was left unchanged.
    Kept,
    /// A new sequence was generated and assigned.
    Assigned(Generated),
}

/// A record field whose value is issued by a [`SequenceGenerator`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct SequenceField {
    /// Path of the field inside the record.
    #[builder(setter(into))]
    path: String,
    #[builder(default)]
    options: GenerationOptions,
}

impl SequenceField {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Fills the field with the next sequence unless it already holds one.
    ///
    /// A value counts as already generated when it is neither empty nor the
    /// placeholder and starts with the resolved prefix, which keeps repeated
    /// validation passes from consuming new numbers.
    pub async fn before_validate<S, C, R>(
        &self,
        generator: &SequenceGenerator<S, C>,
        record: &mut R,
    ) -> Result<FieldOutcome, FieldError>
    where
        S: SequenceStore,
        C: Clock,
        R: RecordMut + ?Sized,
    {
        self.run(generator, record, None).await
    }

    /// Like [`before_validate`](Self::before_validate), but gives up once
    /// `cancel` fires.
    pub async fn before_validate_with_cancel<S, C, R>(
        &self,
        generator: &SequenceGenerator<S, C>,
        record: &mut R,
        cancel: CancellationToken,
    ) -> Result<FieldOutcome, FieldError>
    where
        S: SequenceStore,
        C: Clock,
        R: RecordMut + ?Sized,
    {
        self.run(generator, record, Some(&cancel)).await
    }

    async fn run<S, C, R>(
        &self,
        generator: &SequenceGenerator<S, C>,
        record: &mut R,
        cancel: Option<&CancellationToken>,
    ) -> Result<FieldOutcome, FieldError>
    where
        S: SequenceStore,
        C: Clock,
        R: RecordMut + ?Sized,
    {
        let resolved = match generator.resolve(&self.options, &View(&*record)) {
            Ok(resolved) => resolved,
            Err(GenerateError::Configuration(source)) => {
                return Err(FieldError::Configuration {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(err) => return Err(self.failed(&View(&*record), &err).into()),
        };

        if let Some(existing) = record.field(&self.path) {
            if !existing.is_empty()
                && existing != SEQUENCE_PLACEHOLDER
                && existing.starts_with(resolved.key.prefix())
            {
                debug!(path = %self.path, value = %existing, "field already holds a sequence");
                return Ok(FieldOutcome::Kept);
            }
        }

        let generated = match generator.issue(&resolved, cancel).await {
            Ok(generated) => generated,
            Err(err) => return Err(self.failed(&View(&*record), &err).into()),
        };

        record.set_field(&self.path, generated.value.clone());

        let assigned = record.field(&self.path).unwrap_or_default();
        if assigned.is_empty() {
            warn!(path = %self.path, "generated sequence is empty");
            return Err(ValidationFailure::empty(&self.path, assigned).into());
        }

        Ok(FieldOutcome::Assigned(generated))
    }

    fn failed(&self, record: &dyn RecordView, err: &GenerateError) -> ValidationFailure {
        let value = record.field(&self.path).unwrap_or_default();
        warn!(path = %self.path, error = %err, "sequence generation failed");
        ValidationFailure::generation_failed(&self.path, value, err)
    }
}

/// Sized handle that lets an unsized record be passed on as `&dyn RecordView`.
struct View<'a, R: ?Sized>(&'a R);

impl<R: RecordView + ?Sized> RecordView for View<'_, R> {
    fn record_type(&self) -> Option<&str> {
        self.0.record_type()
    }

    fn field(&self, path: &str) -> Option<&str> {
        self.0.field(path)
    }
}
