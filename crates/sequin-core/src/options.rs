use crate::counter::{Counter, CounterKey};
use crate::error::ConfigError;
use crate::format::{FormatContext, Formatter};
use crate::record::RecordView;
use jiff::{Timestamp, Zoned};
use std::fmt;
use std::sync::Arc;
use typed_builder::TypedBuilder;

pub const DEFAULT_NAMESPACE: &str = "default";
/// Two-digit year, e.g. `21` for 2021.
pub const DEFAULT_YEAR_FORMAT: &str = "%y";
pub const DEFAULT_INCREMENT: i64 = 1;
pub const DEFAULT_LENGTH: usize = 4;
/// Widest padded sequence a caller may ask for.
pub const MAX_LENGTH: usize = 64;
pub const DEFAULT_PAD: char = '0';

/// A function deriving a key part from the record being sequenced.
pub type Resolver = Arc<dyn Fn(&dyn RecordView) -> String + Send + Sync>;

/// A prefix or suffix: either fixed, or derived from the record.
#[derive(Clone)]
pub enum Resolvable {
    Literal(String),
    Derived(Resolver),
}

impl Resolvable {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn derived(f: impl Fn(&dyn RecordView) -> String + Send + Sync + 'static) -> Self {
        Self::Derived(Arc::new(f))
    }

    pub fn resolve(&self, record: &dyn RecordView) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Derived(f) => f(record),
        }
    }
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl From<&str> for Resolvable {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for Resolvable {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Per-call generation settings. Unset fields fall back to the record and
/// then to [`GeneratorDefaults`].
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct GenerationOptions {
    #[builder(default, setter(into, strip_option))]
    pub namespace: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub prefix: Option<Resolvable>,
    #[builder(default, setter(into, strip_option))]
    pub suffix: Option<Resolvable>,
    #[builder(default, setter(strip_option))]
    pub increment: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub length: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub pad: Option<char>,
    #[builder(default, setter(into, strip_option))]
    pub separator: Option<String>,
    #[builder(default, setter(strip_option))]
    pub format: Option<Formatter>,
}

/// Configured fallbacks for every generation option.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GeneratorDefaults {
    #[builder(default = DEFAULT_NAMESPACE.to_string(), setter(into))]
    pub namespace: String,
    /// `strftime` pattern rendering the fallback prefix from the current date.
    #[builder(default = DEFAULT_YEAR_FORMAT.to_string(), setter(into))]
    pub year_format: String,
    #[builder(default = DEFAULT_INCREMENT)]
    pub increment: i64,
    #[builder(default = DEFAULT_LENGTH)]
    pub length: usize,
    #[builder(default = DEFAULT_PAD)]
    pub pad: char,
    #[builder(default, setter(into))]
    pub separator: String,
}

impl Default for GeneratorDefaults {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Fully resolved settings for one generation call.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub key: CounterKey,
    pub increment: i64,
    pub length: usize,
    pub pad: char,
    pub separator: String,
    pub formatter: Formatter,
}

impl ResolvedOptions {
    /// Renders `counter` with the resolved formatter.
    pub fn format(&self, counter: &Counter, timestamp: Timestamp) -> String {
        let ctx = FormatContext {
            namespace: counter.namespace.clone(),
            prefix: counter.prefix.clone(),
            suffix: counter.suffix.clone(),
            sequence: counter.sequence,
            length: self.length,
            pad: self.pad,
            separator: self.separator.clone(),
            timestamp,
        };
        self.formatter.format(&ctx)
    }
}

impl GenerationOptions {
    /// Resolves every option against the record and the configured defaults.
    ///
    /// Fails before any allocation when the resulting key or increment is unusable.
    pub fn resolve(
        &self,
        defaults: &GeneratorDefaults,
        record: &dyn RecordView,
        now: &Zoned,
    ) -> Result<ResolvedOptions, ConfigError> {
        let namespace = match &self.namespace {
            Some(namespace) => namespace.clone(),
            None => record
                .record_type()
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| defaults.namespace.clone()),
        };
        if namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }

        let prefix = match &self.prefix {
            Some(prefix) => prefix.resolve(record),
            None => year_prefix(&defaults.year_format, now)?,
        };
        let suffix = self
            .suffix
            .as_ref()
            .map(|suffix| suffix.resolve(record))
            .unwrap_or_default();

        let increment = self.increment.unwrap_or(defaults.increment);
        if increment <= 0 {
            return Err(ConfigError::InvalidIncrement(increment));
        }

        let length = self.length.unwrap_or(defaults.length);
        if length > MAX_LENGTH {
            return Err(ConfigError::InvalidLength {
                length,
                max: MAX_LENGTH,
            });
        }

        Ok(ResolvedOptions {
            key: CounterKey::new(namespace, prefix).with_suffix(suffix),
            increment,
            length,
            pad: self.pad.unwrap_or(defaults.pad),
            separator: self
                .separator
                .clone()
                .unwrap_or_else(|| defaults.separator.clone()),
            formatter: self.format.clone().unwrap_or_default(),
        })
    }
}

/// Formats `now` with a `strftime` pattern, e.g. `%y` → `21`.
pub fn year_prefix(format: &str, now: &Zoned) -> Result<String, ConfigError> {
    jiff::fmt::strtime::format(format, now).map_err(|e| ConfigError::InvalidYearFormat {
        format: format.to_string(),
        message: e.to_string(),
    })
}
