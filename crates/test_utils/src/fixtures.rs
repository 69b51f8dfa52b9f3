//! Pre-built Test Fixtures
//!
//! Provides ready-to-use CRM data shaped like real describe and query
//! responses. Timestamps use the CRM's own `+0000` rendering so tests go
//! through the same parsing as production traffic.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{FieldSchema, Record};
use serde_json::{json, Value};

/// Fixture for describe results
pub struct SchemaFixtures;

impl SchemaFixtures {
    /// Account fields as described by the CRM (trimmed)
    pub fn account() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("Id", "id").read_only(),
            FieldSchema::new("IsDeleted", "boolean").read_only(),
            FieldSchema::new("Name", "string"),
            FieldSchema::new("External__c", "string").external_id(),
            FieldSchema::new("Legacy_Number__c", "string").external_id(),
            FieldSchema::new("CreatedDate", "datetime").read_only(),
            FieldSchema::new("LastActivityDate", "datetime"),
            FieldSchema::new("SystemModstamp", "datetime").read_only(),
        ]
    }

    /// The same fields as the raw describe JSON payload
    pub fn account_describe() -> Value {
        let fields: Vec<Value> = Self::account()
            .into_iter()
            .map(|f| {
                json!({
                    "name": f.name.clone(),
                    "type": f.field_type,
                    "updateable": f.updateable,
                    "createable": f.createable,
                    "nillable": f.nillable,
                    "externalId": f.external_id,
                    "label": f.name,
                })
            })
            .collect();
        json!({ "name": "Account", "fields": fields })
    }
}

/// Fixture for CRM rows
pub struct RecordFixtures;

impl RecordFixtures {
    /// Three account rows as returned by a query, unordered by modstamp
    pub fn accounts() -> Vec<Record> {
        vec![
            Self::account("0010000000000002", "E2", "Globex", "2023-01-02T08:30:00.000+0000"),
            Self::account("0010000000000001", "E1", "Acme", "2022-12-31T23:59:59.000+0000"),
            Self::account("0010000000000003", "E3", "Initech", "2023-01-03T12:00:00.000+0000"),
        ]
    }

    /// A single account row
    pub fn account(id: &str, external: &str, name: &str, modstamp: &str) -> Record {
        Record::new()
            .with("Id", id)
            .with("IsDeleted", false)
            .with("Name", name)
            .with("External__c", external)
            .with("CreatedDate", "2022-06-01T00:00:00.000+0000")
            .with("LastActivityDate", Value::Null)
            .with("SystemModstamp", modstamp)
    }

    /// An account row sitting in the recycle bin
    pub fn deleted_account() -> Record {
        let mut record = Self::account("0010000000000009", "E9", "Gone", "2023-01-05T00:00:00.000+0000");
        record.insert("IsDeleted".to_string(), Value::Bool(true));
        record
    }
}

/// Fixture for timestamps
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The watermark most extraction tests read from
    pub fn watermark() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    /// [`TemporalFixtures::watermark`] as a request parameter
    pub fn watermark_param() -> &'static str {
        "2023-01-01T00:00:00Z"
    }
}
