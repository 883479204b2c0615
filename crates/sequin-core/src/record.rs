use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only view of the record a sequence is generated for.
///
/// Prefix and suffix resolvers receive this view explicitly; they never rely
/// on ambient state.
pub trait RecordView: Send + Sync {
    /// Name of the record type, used as the fallback namespace.
    fn record_type(&self) -> Option<&str>;

    /// Returns the string value stored at `path`, if any.
    fn field(&self, path: &str) -> Option<&str>;
}

/// A record whose fields can be assigned by a field hook.
pub trait RecordMut: RecordView {
    fn set_field(&mut self, path: &str, value: String);
}

/// A simple string-keyed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    record_type: Option<String>,
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(record_type: impl Into<String>) -> Self {
        Self {
            record_type: Some(record_type.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(path.into(), value.into());
        self
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl RecordView for Record {
    fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    fn field(&self, path: &str) -> Option<&str> {
        self.fields.get(path).map(String::as_str)
    }
}

impl RecordMut for Record {
    fn set_field(&mut self, path: &str, value: String) {
        self.fields.insert(path.to_owned(), value);
    }
}
