//! Backend-ready documents and the [`Indexable`] record contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DocumentBuildError;
use crate::subject::Subject;

/// Name of the mandatory unique-id field.
pub const UID_FIELD: &str = "uid";

/// A mapping from field name to value(s), ready to be sent to the backend.
///
/// Documents are produced fresh on every execution and never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `uid` field as a string, if present.
    pub fn uid(&self) -> Option<&str> {
        self.fields.get(UID_FIELD).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<serde_json::Map<String, Value>> for Document {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

/// A record that can be indexed.
///
/// Implemented by the embedding application for each of its entity types.
pub trait Indexable: Send + Sync {
    /// Identity of this record.
    fn subject(&self) -> Subject;

    /// Render the record's index fields. The `uid` field is filled in by the
    /// document adapter and need not be set here.
    fn render_document(&self) -> Result<Document, DocumentBuildError>;

    /// Called once after each successful index of this record.
    fn after_index_hook(&self) {}
}
