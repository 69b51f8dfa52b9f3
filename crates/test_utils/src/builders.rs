//! Test Data Builders
//!
//! Provides builder patterns for constructing inbound records with sensible
//! defaults. Tests specify only the fields they care about.

use core_kernel::Record;
use serde_json::Value;

/// Builder for inbound (to-be-written) records
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Creates an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a record addressed by internal id
    pub fn with_id(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self::new().field("Id", id)
    }

    /// Starts from a record addressed by an external id
    pub fn with_external(field: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self::new().field(field, value)
    }

    /// Sets a field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record.insert(name.into(), value.into());
        self
    }

    /// Marks the record for deletion
    pub fn deleted(self) -> Self {
        self.field("_deleted", true)
    }

    /// Adds the metadata a feed consumer echoes back
    pub fn echoing_metadata(self, updated: impl Into<String>) -> Self {
        let id = self.record.get("Id").cloned().unwrap_or(Value::Null);
        let updated: String = updated.into();
        self.field("_id", id)
            .field("_updated", updated)
            .field("_deleted", false)
    }

    /// Builds the record
    pub fn build(self) -> Record {
        self.record
    }
}

/// Builds `count` records keyed by `field` with values `{prefix}{n}`
pub fn keyed_batch(field: &str, prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|n| {
            RecordBuilder::with_external(field, format!("{}{}", prefix, n))
                .field("Name", format!("Record {}", n))
                .build()
        })
        .collect()
}
