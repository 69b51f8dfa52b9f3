//! Sync service context
//!
//! Bundles the process-wide state every request needs (the session slot,
//! the schema cache and the static configuration) behind one explicitly
//! constructed value. The HTTP layer holds it in an `Arc` and calls one
//! method per route.

use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use core_kernel::{DatatypeRegistry, Record, RecordKey};

use crate::dispatcher::{Operation, WriteDispatcher, WriteSummary};
use crate::error::SyncError;
use crate::extraction::{self, ExtractFilters, RecordStream};
use crate::normalizer::normalize_untyped;
use crate::ports::ApiMethod;
use crate::schema::SchemaCache;
use crate::session::{Credentials, SessionManager};
use crate::valueset::{self, ValueSetAliases, ValueSetTarget};

/// The sync engine
#[derive(Debug)]
pub struct SyncService {
    sessions: SessionManager,
    schema: SchemaCache,
    registry: DatatypeRegistry,
    value_sets: ValueSetAliases,
}

impl SyncService {
    pub fn new(
        sessions: SessionManager,
        registry: DatatypeRegistry,
        value_sets: ValueSetAliases,
    ) -> Self {
        Self {
            sessions,
            schema: SchemaCache::new(),
            registry,
            value_sets,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    pub fn registry(&self) -> &DatatypeRegistry {
        &self.registry
    }

    pub fn value_set_aliases(&self) -> &ValueSetAliases {
        &self.value_sets
    }

    /// Reads normalized records of `datatype`
    #[instrument(skip(self, credentials), err)]
    pub async fn extract(
        &self,
        credentials: Option<&Credentials>,
        datatype: &str,
        filters: &ExtractFilters,
        key: Option<&RecordKey>,
    ) -> Result<RecordStream, SyncError> {
        let session = self.sessions.get_session(credentials).await?;
        extraction::extract(session.client().clone(), &self.schema, datatype, filters, key).await
    }

    /// Writes records to `datatype`
    #[instrument(skip(self, credentials, records), fields(count = records.len()), err)]
    pub async fn apply(
        &self,
        credentials: Option<&Credentials>,
        datatype: &str,
        records: Vec<Record>,
        operation: Operation,
        key: Option<&RecordKey>,
    ) -> Result<WriteSummary, SyncError> {
        let session = self.sessions.get_session(credentials).await?;
        WriteDispatcher::new(&self.registry)
            .apply(session.client().as_ref(), datatype, records, operation, key)
            .await
    }

    /// Reads the value sets selected by `target`
    pub async fn value_sets(
        &self,
        credentials: Option<&Credentials>,
        target: &ValueSetTarget,
        refine: bool,
    ) -> Result<Vec<Value>, SyncError> {
        let paths = self.value_sets.resolve(target)?;
        let session = self.sessions.get_session(credentials).await?;
        valueset::fetch_value_sets(session.client().as_ref(), &paths, refine).await
    }

    /// Replaces values of value sets
    ///
    /// With [`ValueSetTarget::All`], each item names its own path.
    pub async fn update_value_sets(
        &self,
        credentials: Option<&Credentials>,
        target: &ValueSetTarget,
        items: Vec<Value>,
    ) -> Result<usize, SyncError> {
        let path = match target {
            ValueSetTarget::All => None,
            other => self.value_sets.resolve(other)?.into_iter().next(),
        };
        let session = self.sessions.get_session(credentials).await?;
        valueset::update_value_sets(session.client().as_ref(), path.as_deref(), items).await
    }

    /// Forwards a call to the tooling API; GET results are normalized
    pub async fn tooling(
        &self,
        credentials: Option<&Credentials>,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        let session = self.sessions.get_session(credentials).await?;
        let response = session.client().tooling(method, path, body).await?;
        Ok(match (method, response) {
            (ApiMethod::Get, Value::Object(map)) => normalize_untyped(Record::from(map)).into_value(),
            (_, other) => other,
        })
    }

    /// Forwards a call to the REST API
    pub async fn rest(
        &self,
        credentials: Option<&Credentials>,
        method: ApiMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        let session = self.sessions.get_session(credentials).await?;
        Ok(session.client().rest(method, path, params, body).await?)
    }
}

/// Shared handle to the sync service
pub type SharedSyncService = Arc<SyncService>;
