//! Record and field schema types
//!
//! A CRM record is a dynamically shaped object: its fields depend on the
//! datatype's schema, which is only known at runtime through the describe
//! call. Records are therefore modelled as an insertion-ordered map from field
//! name to JSON value, wrapped in a newtype carrying the connector's
//! conventions (internal `_` fields, truthiness of key fields, deletion flag).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// Prefix marking connector metadata fields (`_id`, `_updated`, `_deleted`, ...)
pub const INTERNAL_FIELD_PREFIX: char = '_';

/// Metadata field holding the record identity on the wire
pub const META_ID: &str = "_id";

/// Metadata field holding the modification timestamp on the wire
pub const META_UPDATED: &str = "_updated";

/// Metadata field holding the deletion flag on the wire
pub const META_DELETED: &str = "_deleted";

/// Describe type name of timestamp fields
pub const DATETIME_TYPE: &str = "datetime";

/// A single CRM record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Returns a field as a string slice if it holds a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Renders a field as key text if it holds a truthy scalar
    ///
    /// Empty strings, zero, `false`, `null` and containers are not usable as
    /// identities and yield `None`.
    pub fn key_text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }

    /// True when the record carries `_deleted: true`
    pub fn is_marked_deleted(&self) -> bool {
        matches!(self.0.get(META_DELETED), Some(Value::Bool(true)))
    }

    /// True when any connector metadata field is present
    pub fn has_internal_fields(&self) -> bool {
        self.0.keys().any(|k| k.starts_with(INTERNAL_FIELD_PREFIX))
    }

    /// Removes every `_`-prefixed field in place
    pub fn strip_internal(&mut self) {
        self.0.retain(|k, _| !k.starts_with(INTERNAL_FIELD_PREFIX));
    }

    /// Consuming variant of [`Record::strip_internal`]
    pub fn without_internal(mut self) -> Self {
        self.strip_internal();
        self
    }
}

impl Deref for Record {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Record {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Field metadata as reported by the describe call
///
/// Only the attributes the connector relies on are kept; everything else the
/// describe payload carries is ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub updateable: bool,
    #[serde(default)]
    pub createable: bool,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub external_id: bool,
}

impl FieldSchema {
    /// Creates a writable field of the given describe type
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            updateable: true,
            createable: true,
            nillable: true,
            external_id: false,
        }
    }

    /// Marks the field as system maintained
    pub fn read_only(mut self) -> Self {
        self.updateable = false;
        self.createable = false;
        self
    }

    /// Marks the field as an external id
    pub fn external_id(mut self) -> Self {
        self.external_id = true;
        self
    }

    pub fn is_datetime(&self) -> bool {
        self.field_type == DATETIME_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_internal_keeps_order() {
        let record = Record::new()
            .with("Name", "Acme")
            .with("_id", "001")
            .with("Id", "001")
            .with("_deleted", false);

        let stripped = record.without_internal();
        let keys: Vec<_> = stripped.keys().cloned().collect();
        assert_eq!(keys, vec!["Name", "Id"]);
    }

    #[test]
    fn test_key_text_truthiness() {
        let record = Record::from_value(json!({
            "Empty": "",
            "Zero": 0,
            "Num": 42,
            "Null": null,
            "Text": "E1"
        }))
        .unwrap();

        assert_eq!(record.key_text("Empty"), None);
        assert_eq!(record.key_text("Zero"), None);
        assert_eq!(record.key_text("Null"), None);
        assert_eq!(record.key_text("Missing"), None);
        assert_eq!(record.key_text("Num"), Some("42".to_string()));
        assert_eq!(record.key_text("Text"), Some("E1".to_string()));
    }

    #[test]
    fn test_field_schema_from_describe_payload() {
        let field: FieldSchema = serde_json::from_value(json!({
            "name": "SystemModstamp",
            "type": "datetime",
            "updateable": false,
            "createable": false,
            "label": "System Modstamp",
            "length": 0
        }))
        .unwrap();

        assert!(field.is_datetime());
        assert!(!field.updateable && !field.createable);
        assert!(!field.external_id);
    }
}
