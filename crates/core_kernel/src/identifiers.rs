//! Record identity keys
//!
//! A record is addressed either by its CRM-assigned `Id` or by one of the
//! datatype's external id fields. Both render to the path segment the CRM's
//! REST API expects: `001xx...` for an internal id, `Field__c/value` for an
//! external one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::record::Record;

/// Name of the CRM's internal identity field
pub const ID_FIELD: &str = "Id";

/// Identity used to address a single CRM record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKey {
    /// The CRM-assigned internal id
    Id(String),
    /// An external id field and its value
    External { field: String, value: String },
}

impl RecordKey {
    pub fn id(value: impl Into<String>) -> Self {
        RecordKey::Id(value.into())
    }

    pub fn external(field: impl Into<String>, value: impl Into<String>) -> Self {
        RecordKey::External {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Parses a key path as produced by [`RecordKey::path`]
    ///
    /// A path containing a `/` is an external key split at the first slash.
    pub fn from_path(path: &str) -> Self {
        match path.split_once('/') {
            Some((field, value)) => RecordKey::external(field, value),
            None => RecordKey::id(path),
        }
    }

    /// The field this key is matched against
    pub fn field(&self) -> &str {
        match self {
            RecordKey::Id(_) => ID_FIELD,
            RecordKey::External { field, .. } => field,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RecordKey::Id(value) => value,
            RecordKey::External { value, .. } => value,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RecordKey::Id(_))
    }

    /// REST path segment addressing the record
    pub fn path(&self) -> String {
        match self {
            RecordKey::Id(value) => value.clone(),
            RecordKey::External { field, value } => format!("{}/{}", field, value),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Id(value) => write!(f, "{}", value),
            RecordKey::External { field, value } => write!(f, "{}/{}", field, value),
        }
    }
}

/// Resolves the identity of a record about to be written
///
/// Precedence: a non-empty `Id`, then the first non-empty field of
/// `ordered_key_fields`, then the caller-supplied key.
///
/// # Errors
///
/// Returns `CoreError::Validation` when none of the three yields a key.
pub fn resolve_identity(
    record: &Record,
    ordered_key_fields: &[String],
    caller_key: Option<&RecordKey>,
) -> Result<RecordKey, CoreError> {
    if let Some(id) = record.key_text(ID_FIELD) {
        return Ok(RecordKey::Id(id));
    }

    let external = ordered_key_fields.iter().find_map(|field| {
        record
            .key_text(field)
            .map(|value| RecordKey::external(field.clone(), value))
    });
    if let Some(key) = external {
        return Ok(key);
    }

    caller_key.cloned().ok_or_else(|| {
        CoreError::validation(format!(
            "cannot figure out the object key for {}",
            serde_json::Value::Object(record.clone().into_inner())
        ))
    })
}
