//! Record normalization
//!
//! Turns raw CRM records into the uniform feed shape:
//!
//! - `_id` mirrors `Id`
//! - datetime fields are rendered as transit datetimes (`~t...Z`)
//! - `_updated` is the modification stamp without the transit tag
//! - `_deleted` mirrors `IsDeleted`
//!
//! Normalizing an already normalized record changes nothing.

use serde_json::Value;
use tracing::debug;

use core_kernel::record::{META_DELETED, META_ID, META_UPDATED};
use core_kernel::temporal::{from_epoch_millis, parse_timestamp, strip_transit_tag, to_transit};
use core_kernel::{FieldSchema, Record, ID_FIELD};

use crate::query::{IS_DELETED, SYSTEM_MODSTAMP};

/// Normalizes a raw record against the fields of its datatype
pub fn normalize(fields: &[FieldSchema], mut record: Record) -> Record {
    let id = record.get(ID_FIELD).cloned().unwrap_or(Value::Null);
    record.insert(META_ID.to_string(), id);

    for field in fields.iter().filter(|f| f.is_datetime()) {
        if let Some(value) = record.get_mut(&field.name) {
            if let Some(transit) = transit_value(value) {
                *value = Value::String(transit);
            } else if is_truthy(value) {
                debug!(field = %field.name, value = %value, "left unparseable datetime untouched");
            }
        }
    }

    let updated = record
        .get_str(SYSTEM_MODSTAMP)
        .map(|stamp| Value::String(strip_transit_tag(stamp).to_string()))
        .unwrap_or(Value::Null);
    record.insert(META_UPDATED.to_string(), updated);

    let deleted = match record.get(IS_DELETED) {
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    };
    record.insert(META_DELETED.to_string(), Value::Bool(deleted));

    record
}

/// Normalizes a record whose schema is unknown
///
/// Only the metadata fields are derived; no value is reinterpreted.
pub fn normalize_untyped(record: Record) -> Record {
    normalize(&[], record)
}

fn transit_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if millis == 0 {
                return None;
            }
            from_epoch_millis(millis).ok().map(|dt| to_transit(&dt))
        }
        Value::String(s) if !s.is_empty() => parse_timestamp(s).ok().map(|dt| to_transit(&dt)),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
