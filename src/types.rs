//! Shared record types used across the migration pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field map underlying every record: field name -> JSON scalar/string.
pub type FieldMap = serde_json::Map<String, Value>;

/// Record group names. Each extractor owns exactly one group, so group
/// partitioning is disjoint by construction.
pub mod groups {
    pub const SECTIONS: &str = "sections";
    pub const POSTS: &str = "posts";
    pub const AUTHORS: &str = "authors";
    pub const ATTACHMENTS: &str = "attachments";
}

/// A record is missing a field a downstream consumer requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required field '{0}'")]
pub struct MissingField(pub String);

/// One logical unit from the source export (a post, an author, a section,
/// a media attachment). Immutable once aggregated; never carries an internal
/// surrogate identifier beyond the fields present in the original export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: FieldMap,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as a string slice, if present and a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Get a required field value
    pub fn require(&self, field: &str) -> Result<&Value, MissingField> {
        self.fields
            .get(field)
            .ok_or_else(|| MissingField(field.to_string()))
    }

    /// Get a required string field
    pub fn require_str(&self, field: &str) -> Result<&str, MissingField> {
        self.require(field)?
            .as_str()
            .ok_or_else(|| MissingField(field.to_string()))
    }

    /// Remove a field, returning its value if present
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Iterate over all fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<FieldMap> for Record {
    fn from(fields: FieldMap) -> Self {
        Self { fields }
    }
}
