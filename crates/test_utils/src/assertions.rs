//! Custom Test Assertions
//!
//! Provides assertion helpers for normalized feeds that give more
//! meaningful failure messages than comparing whole records.

use core_kernel::temporal::parse_timestamp;
use core_kernel::Record;

/// Asserts that a record carries the three feed metadata fields
///
/// # Panics
///
/// Panics if `_id`, `_updated` or `_deleted` is missing, or `_deleted` is
/// not a boolean
pub fn assert_normalized(record: &Record) {
    for field in ["_id", "_updated", "_deleted"] {
        assert!(
            record.contains_key(field),
            "normalized record lacks {}: {}",
            field,
            serde_json::Value::Object(record.clone().into_inner())
        );
    }
    assert!(
        record["_deleted"].is_boolean(),
        "_deleted must be a boolean, got {}",
        record["_deleted"]
    );
}

/// Asserts that no `_`-prefixed field is present
pub fn assert_no_internal_fields(record: &Record) {
    let internal: Vec<&String> = record.keys().filter(|k| k.starts_with('_')).collect();
    assert!(internal.is_empty(), "unexpected internal fields {:?}", internal);
}

/// Asserts that `_updated` is strictly after `since` and ascending
///
/// # Panics
///
/// Panics on the first record violating either property
pub fn assert_updated_after_ascending(records: &[Record], since: &str) {
    let since = parse_timestamp(since).expect("since must be a timestamp");
    let mut previous = None;

    for record in records {
        let updated = record
            .get_str("_updated")
            .and_then(|u| parse_timestamp(u).ok())
            .unwrap_or_else(|| panic!("record without a parseable _updated: {:?}", record));
        assert!(updated > since, "{} is not after {}", updated, since);
        if let Some(previous) = previous {
            assert!(updated >= previous, "{} comes after {}", updated, previous);
        }
        previous = Some(updated);
    }
}
