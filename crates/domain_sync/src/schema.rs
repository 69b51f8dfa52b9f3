//! Per-datatype field schema cache
//!
//! Describe results are fetched once per datatype and kept for the lifetime
//! of the process. The describe call runs without holding the lock, so two
//! requests populating the same datatype concurrently both call the CRM and
//! the last one to finish wins; both write the same content.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use core_kernel::{FieldSchema, PortError};

use crate::error::SyncError;
use crate::ports::CrmPort;

/// Cache of datatype name to described fields
#[derive(Debug, Default)]
pub struct SchemaCache {
    fields: RwLock<HashMap<String, Arc<[FieldSchema]>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached fields of `datatype`, describing it on first use
    ///
    /// # Errors
    ///
    /// `SyncError::NotFound` when the CRM does not know the datatype.
    pub async fn ensure_fields(
        &self,
        client: &dyn CrmPort,
        datatype: &str,
    ) -> Result<Arc<[FieldSchema]>, SyncError> {
        let cached = self.fields.read().await.get(datatype).cloned();
        if let Some(fields) = cached {
            return Ok(fields);
        }

        let described = client.resource(datatype).describe().await.map_err(|e| match e {
            PortError::NotFound { .. } => {
                SyncError::not_found(format!("unknown datatype {}", datatype))
            }
            other => other.into(),
        })?;
        debug!(datatype, fields = described.len(), "described datatype");

        let fields: Arc<[FieldSchema]> = described.into();
        self.fields
            .write()
            .await
            .insert(datatype.to_string(), fields.clone());
        Ok(fields)
    }

    /// Cached fields of `datatype` without contacting the CRM
    pub async fn cached(&self, datatype: &str) -> Option<Arc<[FieldSchema]>> {
        self.fields.read().await.get(datatype).cloned()
    }
}
