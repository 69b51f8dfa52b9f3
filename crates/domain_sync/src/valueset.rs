//! Picklist value sets
//!
//! Value sets live in the CRM's tooling API either as global value sets or
//! as the inline value set of a custom picklist field. Both are read and
//! written as whole tooling objects; the values themselves sit at a
//! kind-specific location inside the object's `Metadata`.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::SyncError;
use crate::ports::{ApiMethod, CrmPort};

const GLOBAL_VALUE_SET_PREFIX: &str = "/GlobalValueSet/";
const CUSTOM_FIELD_PREFIX: &str = "/CustomField/";

/// Tooling object fields the CRM refuses on update
pub const READ_ONLY_TOOLING_FIELDS: [&str; 10] = [
    "Id",
    "DeveloperName",
    "MasterLabel",
    "Description",
    "NamespacePrefix",
    "ManageableState",
    "CreatedDate",
    "CreatedById",
    "LastModifiedDate",
    "LastModifiedById",
];

/// Where the values of a value set are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSetKind {
    /// `Metadata.customValue`
    Global,
    /// `Metadata.valueSet.valueSetDefinition.value`
    CustomField,
    Other,
}

impl ValueSetKind {
    pub fn of(path: &str) -> Self {
        if path.starts_with(GLOBAL_VALUE_SET_PREFIX) {
            ValueSetKind::Global
        } else if path.starts_with(CUSTOM_FIELD_PREFIX) {
            ValueSetKind::CustomField
        } else {
            ValueSetKind::Other
        }
    }
}

/// Value sets selected by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSetTarget {
    /// Every configured alias
    All,
    /// A tooling path such as `/GlobalValueSet/0Nt...`
    Path(String),
    /// A configured alias
    Alias(String),
}

/// Configured alias to tooling path mapping (`VALUESET_LIST`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSetAliases {
    entries: Vec<(String, String)>,
}

impl ValueSetAliases {
    pub fn new<I, A, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(alias, path)| (alias.into(), path.into()))
                .collect(),
        }
    }

    /// Parses a JSON object of alias to path, keeping its order
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let map: Map<String, Value> = serde_json::from_str(trimmed)
            .map_err(|e| SyncError::unexpected(format!("invalid VALUESET_LIST: {}", e)))?;

        let mut entries = Vec::with_capacity(map.len());
        for (alias, path) in map {
            match path {
                Value::String(path) => entries.push((alias, path)),
                other => {
                    return Err(SyncError::unexpected(format!(
                        "VALUESET_LIST entry {} is not a string: {}",
                        alias, other
                    )))
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn path_of(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, path)| path.as_str())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, path)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tooling paths addressed by `target`
    ///
    /// # Errors
    ///
    /// `SyncError::Validation` for an alias that is not configured.
    pub fn resolve(&self, target: &ValueSetTarget) -> Result<Vec<String>, SyncError> {
        match target {
            ValueSetTarget::All => Ok(self.paths().map(str::to_string).collect()),
            ValueSetTarget::Path(path) => Ok(vec![path.clone()]),
            ValueSetTarget::Alias(alias) => self
                .path_of(alias)
                .map(|path| vec![path.to_string()])
                .ok_or_else(|| SyncError::validation(format!("cannot map alias {} to a CRM id", alias))),
        }
    }
}

fn tooling_path(path: &str) -> String {
    format!("sobjects{}", path)
}

/// Reads value sets
///
/// Each item is `{path, _id, data}`. Refined items carry only the values;
/// unrefined ones the whole tooling object.
pub async fn fetch_value_sets(
    client: &dyn CrmPort,
    paths: &[String],
    refine: bool,
) -> Result<Vec<Value>, SyncError> {
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let object = client
            .tooling(ApiMethod::Get, &tooling_path(path), None)
            .await?;

        let mut item = Map::new();
        item.insert("path".to_string(), json!(path));
        item.insert("_id".to_string(), json!(path));
        if !refine {
            item.insert("data".to_string(), object);
        } else if let Some(values) = refined_values(path, &object) {
            item.insert("data".to_string(), values);
        }
        items.push(Value::Object(item));
    }
    Ok(items)
}

fn refined_values(path: &str, object: &Value) -> Option<Value> {
    let metadata = object.get("Metadata");
    match ValueSetKind::of(path) {
        ValueSetKind::Global => Some(
            metadata
                .and_then(|m| m.get("customValue"))
                .cloned()
                .unwrap_or(Value::Null),
        ),
        ValueSetKind::CustomField => Some(
            metadata
                .and_then(|m| m.pointer("/valueSet/valueSetDefinition/value"))
                .cloned()
                .unwrap_or_else(|| json!([])),
        ),
        ValueSetKind::Other => None,
    }
}

/// Replaces the values of value sets
///
/// Each item carries its values under `data`. Without a `target`, each item
/// names its own tooling path under `path`.
///
/// # Errors
///
/// `SyncError::Validation` when an item lacks a usable `path`; CRM failures
/// as `SyncError::Crm`.
pub async fn update_value_sets(
    client: &dyn CrmPort,
    target: Option<&str>,
    items: Vec<Value>,
) -> Result<usize, SyncError> {
    let mut updated = 0;
    for item in items {
        let path = match target {
            Some(path) => path.to_string(),
            None => item
                .get("path")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SyncError::validation("value set item has no path"))?,
        };
        let values = item.get("data").cloned().unwrap_or(Value::Null);

        let current = client
            .tooling(ApiMethod::Get, &tooling_path(&path), None)
            .await?;
        let patch = patched_object(&path, current, values);
        debug!(path = %path, "updating value set");
        client
            .tooling(ApiMethod::Patch, &tooling_path(&path), Some(&patch))
            .await?;
        updated += 1;
    }
    Ok(updated)
}

/// Splices `values` into the tooling object and drops read-only fields
fn patched_object(path: &str, current: Value, values: Value) -> Value {
    let mut object = match current {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match ValueSetKind::of(path) {
        ValueSetKind::Global => {
            let metadata = object_entry(&mut object, "Metadata");
            metadata.insert("customValue".to_string(), values);
        }
        ValueSetKind::CustomField => {
            let metadata = object
                .remove("Metadata")
                .and_then(|m| match m {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .unwrap_or_default();
            object = Map::new();
            object.insert("Metadata".to_string(), Value::Object(metadata));

            let value_set = object_entry(object_entry(&mut object, "Metadata"), "valueSet");
            object_entry(value_set, "valueSetDefinition").insert("value".to_string(), values);
            let settings_empty = value_set
                .get("valueSettings")
                .map(|s| s.is_null() || s.as_array().map(Vec::is_empty).unwrap_or(false))
                .unwrap_or(true);
            if settings_empty {
                value_set.insert("valueSettings".to_string(), json!([]));
            }
        }
        ValueSetKind::Other => {}
    }

    object.retain(|field, _| !READ_ONLY_TOOLING_FIELDS.contains(&field.as_str()));
    Value::Object(object)
}

/// The object stored under `field`, replacing anything that is not an object
fn object_entry<'m>(map: &'m mut Map<String, Value>, field: &str) -> &'m mut Map<String, Value> {
    let entry = map
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(inner) => inner,
        _ => unreachable!("entry was just made an object"),
    }
}
