use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a counter.
///
/// An empty suffix is normalised to `None`, so `("a", "b", "")` and
/// `("a", "b", None)` address the same counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterKey {
    namespace: String,
    prefix: String,
    suffix: Option<String>,
}

impl CounterKey {
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = (!suffix.is_empty()).then_some(suffix);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.prefix)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "/{suffix}")?;
        }
        Ok(())
    }
}

/// Snapshot of a persisted counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub namespace: String,
    pub prefix: String,
    pub suffix: Option<String>,
    /// Latest allocated value for this key.
    pub sequence: i64,
}

impl Counter {
    pub fn new(key: &CounterKey, sequence: i64) -> Self {
        Self {
            namespace: key.namespace.clone(),
            prefix: key.prefix.clone(),
            suffix: key.suffix.clone(),
            sequence,
        }
    }

    pub fn key(&self) -> CounterKey {
        let key = CounterKey::new(&self.namespace, &self.prefix);
        match &self.suffix {
            Some(suffix) => key.with_suffix(suffix),
            None => key,
        }
    }
}
