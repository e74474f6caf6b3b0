//! Extracted field records.

use serde::{Deserialize, Serialize};

/// Field name to text value mapping produced for one identifier.
///
/// Keys keep the order in which they were first inserted so that exported
/// columns follow page order. Inserting an existing key replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRecord {
    fields: Vec<(String, String)>,
}

impl FieldRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record where every given field is present and empty.
    pub fn blank<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut record = Self::new();
        for name in names {
            record.insert(name, String::new());
        }
        record
    }

    /// Set a field value, replacing any previous value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields holding a non-empty value.
    pub fn filled_count(&self) -> usize {
        self.fields.iter().filter(|(_, v)| !v.is_empty()).count()
    }
}
