//! Datatype Registry
//!
//! Holds the per-datatype write configuration loaded at startup: which
//! external id fields identify a record (in priority order) and above how
//! many records a write switches to the bulk API. The registry is immutable
//! once built and is shared by reference across requests.
//!
//! # Configuration
//!
//! The registry is usually built from the `SF_OBJECTS_CONFIG` JSON document:
//!
//! ```rust
//! use core_kernel::registry::DatatypeRegistry;
//!
//! let registry = DatatypeRegistry::from_json(
//!     r#"{"Account": {"ordered_key_fields": ["External__c"], "bulk_switch_threshold": 500}}"#,
//!     100,
//! ).unwrap();
//!
//! assert_eq!(registry.ordered_key_fields("Account"), ["External__c".to_string()]);
//! assert_eq!(registry.bulk_threshold("Account"), Some(500));
//! assert_eq!(registry.bulk_threshold("Contact"), Some(100));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreError;

/// Write configuration of a single datatype
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatatypeConfig {
    /// External id fields tried, in order, when a record carries no `Id`
    #[serde(default)]
    pub ordered_key_fields: Vec<String>,

    /// Record count above which writes use the bulk API
    #[serde(default)]
    pub bulk_switch_threshold: Option<usize>,
}

impl DatatypeConfig {
    pub fn with_key_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ordered_key_fields: fields.into_iter().map(Into::into).collect(),
            bulk_switch_threshold: None,
        }
    }

    pub fn with_bulk_threshold(mut self, threshold: usize) -> Self {
        self.bulk_switch_threshold = Some(threshold);
        self
    }
}

/// Registry of datatype configurations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatatypeRegistry {
    datatypes: HashMap<String, DatatypeConfig>,
    default_bulk_switch_threshold: usize,
}

impl DatatypeRegistry {
    /// Creates a registry; a zero default threshold disables bulk writes
    pub fn new(default_bulk_switch_threshold: usize) -> Self {
        Self {
            datatypes: HashMap::new(),
            default_bulk_switch_threshold,
        }
    }

    /// Parses the JSON mapping of datatype name to [`DatatypeConfig`]
    pub fn from_json(json: &str, default_bulk_switch_threshold: usize) -> Result<Self, CoreError> {
        let trimmed = json.trim();
        let datatypes = if trimmed.is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(trimmed).map_err(|e| {
                CoreError::configuration(format!("invalid datatype configuration: {}", e))
            })?
        };

        Ok(Self {
            datatypes,
            default_bulk_switch_threshold,
        })
    }

    /// Registers or replaces a datatype configuration
    pub fn with_datatype(mut self, datatype: impl Into<String>, config: DatatypeConfig) -> Self {
        self.datatypes.insert(datatype.into(), config);
        self
    }

    pub fn get(&self, datatype: &str) -> Option<&DatatypeConfig> {
        self.datatypes.get(datatype)
    }

    pub fn default_bulk_switch_threshold(&self) -> usize {
        self.default_bulk_switch_threshold
    }

    /// External id fields for a datatype, empty when unconfigured
    pub fn ordered_key_fields(&self, datatype: &str) -> &[String] {
        self.datatypes
            .get(datatype)
            .map(|c| c.ordered_key_fields.as_slice())
            .unwrap_or(&[])
    }

    /// Effective bulk threshold, `None` when bulk writes are disabled
    ///
    /// The effective threshold is the larger of the global default and the
    /// datatype's own threshold.
    pub fn bulk_threshold(&self, datatype: &str) -> Option<usize> {
        if self.default_bulk_switch_threshold == 0 {
            return None;
        }
        let own = self
            .datatypes
            .get(datatype)
            .and_then(|c| c.bulk_switch_threshold)
            .unwrap_or(0);
        Some(self.default_bulk_switch_threshold.max(own))
    }

    /// True when a write of `count` records should use the bulk path
    pub fn use_bulk(&self, datatype: &str, count: usize) -> bool {
        self.bulk_threshold(datatype)
            .map(|threshold| count > threshold)
            .unwrap_or(false)
    }
}
