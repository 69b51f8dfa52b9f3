//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating CRM-shaped test data.

use core_kernel::Record;
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for 15-character CRM ids of the given three-letter prefix
pub fn record_id_strategy(prefix: &'static str) -> impl Strategy<Value = String> {
    "[0-9A-Za-z]{12}".prop_map(move |tail| format!("{}{}", prefix, tail))
}

/// Strategy for external id values
pub fn external_value_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{1,3}-[0-9]{1,6}"
}

/// Strategy for epoch milliseconds between year 1 and year 9999
pub fn epoch_millis_strategy() -> impl Strategy<Value = i64> {
    -62_135_596_800_000i64..253_402_300_799_000i64
}

/// Strategy for timestamps in the CRM's wire rendering
pub fn crm_timestamp_strategy() -> impl Strategy<Value = String> {
    (1970i32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60, 0u32..1000).prop_map(
        |(y, mo, d, h, mi, s, ms)| {
            format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}+0000", y, mo, d, h, mi, s, ms)
        },
    )
}

/// Strategy for scalar field values
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::from),
    ]
}

/// Strategy for raw account rows as a query would return them
pub fn account_row_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy("001"),
        external_value_strategy(),
        "[A-Za-z ]{1,24}",
        crm_timestamp_strategy(),
        any::<bool>(),
        scalar_value_strategy(),
    )
        .prop_map(|(id, external, name, modstamp, deleted, extra)| {
            Record::new()
                .with("Id", id)
                .with("External__c", external)
                .with("Name", name)
                .with("Description", extra)
                .with("SystemModstamp", modstamp)
                .with("IsDeleted", deleted)
        })
}
