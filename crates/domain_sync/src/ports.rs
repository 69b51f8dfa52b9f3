//! Sync Domain Ports
//!
//! This module defines the port interfaces the sync engine needs from the
//! CRM, enabling swappable implementations (the Salesforce REST and Bulk
//! transport, an in-memory mock for tests).
//!
//! # Architecture
//!
//! - [`CrmConnector`] authenticates a set of credentials and hands back a
//!   connected client.
//! - [`CrmPort`] is that client: describe, query, keyed reads and writes,
//!   bulk jobs and raw passthrough to the tooling and REST APIs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_sync::ports::CrmPort;
//! use core_kernel::RecordKey;
//!
//! let session = sessions.get_session(None).await?;
//! let account = session
//!     .client()
//!     .resource("Account")
//!     .get(&RecordKey::id("001xx000003DGb1"))
//!     .await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use core_kernel::{DeleteOutcome, DomainPort, FieldSchema, PortError, Record, RecordKey};

use crate::query::SoqlQuery;
use crate::session::Credentials;

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Records of this page, in server order
    pub records: Vec<Record>,
    /// Cursor for the next page, absent on the last page
    pub next: Option<String>,
    /// Total number of matching records, when the CRM reports it
    pub total_size: Option<u64>,
}

impl QueryPage {
    pub fn last(records: Vec<Record>) -> Self {
        Self {
            records,
            next: None,
            total_size: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Per-row outcome of a bulk job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRowResult {
    #[serde(default)]
    pub id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl BulkRowResult {
    pub fn succeeded(id: impl Into<String>, created: bool) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            created,
            errors: Vec::new(),
        }
    }

    pub fn failed(error: Value) -> Self {
        Self {
            id: None,
            success: false,
            created: false,
            errors: vec![error],
        }
    }
}

/// HTTP method forwarded to the passthrough APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Patch => "PATCH",
            ApiMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The port trait for CRM operations
///
/// All methods are async and return `Result<T, PortError>` so the engine
/// handles every adapter's failures the same way.
#[async_trait]
pub trait CrmPort: DomainPort {
    /// Describes the fields of a datatype
    ///
    /// # Returns
    ///
    /// The field list in describe order, or `PortError::NotFound` when the
    /// datatype does not exist
    async fn describe(&self, datatype: &str) -> Result<Vec<FieldSchema>, PortError>;

    /// Runs a query and returns its first page
    async fn query(&self, query: &SoqlQuery) -> Result<QueryPage, PortError>;

    /// Fetches the page a previous [`QueryPage::next`] cursor points at
    async fn query_more(&self, cursor: &str) -> Result<QueryPage, PortError>;

    /// Reads a single record
    ///
    /// # Returns
    ///
    /// The record, or `PortError::NotFound` when the key matches nothing
    async fn get(&self, datatype: &str, key: &RecordKey) -> Result<Record, PortError>;

    /// Writes a record keyed by `key`
    ///
    /// An internal id key updates the record; an external key updates the
    /// matching record or creates it.
    async fn upsert(&self, datatype: &str, key: &RecordKey, record: &Record)
        -> Result<(), PortError>;

    /// Deletes a single record
    ///
    /// # Returns
    ///
    /// `DeleteOutcome::NotFound` when there was nothing to delete
    async fn delete(&self, datatype: &str, key: &RecordKey) -> Result<DeleteOutcome, PortError>;

    /// Upserts a batch of records through a bulk job matched on `external_id_field`
    async fn bulk_upsert(
        &self,
        datatype: &str,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError>;

    /// Deletes a batch of records (each carrying `Id`) through a bulk job
    async fn bulk_delete(
        &self,
        datatype: &str,
        records: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError>;

    /// Calls the tooling API at `path` relative to its root
    async fn tooling(
        &self,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PortError>;

    /// Calls the REST API at `path` relative to the versioned data root
    async fn rest(
        &self,
        method: ApiMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, PortError>;
}

/// Establishes authenticated CRM clients
#[async_trait]
pub trait CrmConnector: DomainPort {
    /// Logs in with `credentials`
    ///
    /// # Returns
    ///
    /// A connected client, or `PortError::Unauthorized` when the CRM
    /// rejects the credentials
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn CrmPort>, PortError>;
}

/// Handle on one datatype of a connected client
#[derive(Clone, Copy)]
pub struct SObject<'a> {
    port: &'a dyn CrmPort,
    datatype: &'a str,
}

impl<'a> SObject<'a> {
    pub fn datatype(&self) -> &'a str {
        self.datatype
    }

    pub async fn describe(&self) -> Result<Vec<FieldSchema>, PortError> {
        self.port.describe(self.datatype).await
    }

    pub async fn get(&self, key: &RecordKey) -> Result<Record, PortError> {
        self.port.get(self.datatype, key).await
    }

    pub async fn upsert(&self, key: &RecordKey, record: &Record) -> Result<(), PortError> {
        self.port.upsert(self.datatype, key, record).await
    }

    pub async fn delete(&self, key: &RecordKey) -> Result<DeleteOutcome, PortError> {
        self.port.delete(self.datatype, key).await
    }

    pub async fn bulk_upsert(
        &self,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError> {
        self.port
            .bulk_upsert(self.datatype, external_id_field, records)
            .await
    }

    pub async fn bulk_delete(&self, records: &[Record]) -> Result<Vec<BulkRowResult>, PortError> {
        self.port.bulk_delete(self.datatype, records).await
    }
}

impl fmt::Debug for SObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SObject")
            .field("datatype", &self.datatype)
            .finish()
    }
}

impl dyn CrmPort {
    /// Returns a handle scoped to `datatype`
    pub fn resource<'a>(&'a self, datatype: &'a str) -> SObject<'a> {
        SObject {
            port: self,
            datatype,
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Mutex, RwLock};

    use core_kernel::temporal::parse_timestamp;
    use core_kernel::ID_FIELD;

    use crate::query::{IS_DELETED, SYSTEM_MODSTAMP};

    /// A call received by [`MockCrmPort`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CrmCall {
        Describe(String),
        Query(String),
        QueryMore(String),
        Get { datatype: String, key: String },
        Upsert { datatype: String, key: String },
        Delete { datatype: String, key: String },
        BulkUpsert { datatype: String, external_id_field: String, rows: usize },
        BulkDelete { datatype: String, rows: usize },
        Tooling { method: ApiMethod, path: String },
        Rest { method: ApiMethod, path: String },
    }

    impl CrmCall {
        pub fn is_write(&self) -> bool {
            matches!(
                self,
                CrmCall::Upsert { .. }
                    | CrmCall::Delete { .. }
                    | CrmCall::BulkUpsert { .. }
                    | CrmCall::BulkDelete { .. }
            )
        }
    }

    /// In-memory mock implementation of CrmPort
    #[derive(Debug)]
    pub struct MockCrmPort {
        schemas: RwLock<HashMap<String, Vec<FieldSchema>>>,
        records: RwLock<HashMap<String, Vec<Record>>>,
        tooling_objects: RwLock<HashMap<String, Value>>,
        failing_keys: HashSet<String>,
        page_size: usize,
        cursors: Mutex<HashMap<String, Vec<Record>>>,
        calls: Mutex<Vec<CrmCall>>,
        next_id: AtomicUsize,
    }

    impl Default for MockCrmPort {
        fn default() -> Self {
            Self {
                schemas: RwLock::default(),
                records: RwLock::default(),
                tooling_objects: RwLock::default(),
                failing_keys: HashSet::new(),
                page_size: 2000,
                cursors: Mutex::default(),
                calls: Mutex::default(),
                next_id: AtomicUsize::new(1),
            }
        }
    }

    impl MockCrmPort {
        /// Creates a new mock port
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a datatype and its describe result
        pub fn with_schema(mut self, datatype: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
            self.schemas.get_mut().insert(datatype.into(), fields);
            self
        }

        /// Pre-populates stored records of a datatype
        pub fn with_records(mut self, datatype: impl Into<String>, records: Vec<Record>) -> Self {
            self.records
                .get_mut()
                .entry(datatype.into())
                .or_default()
                .extend(records);
            self
        }

        /// Splits query results into pages of `page_size` records
        pub fn with_page_size(mut self, page_size: usize) -> Self {
            self.page_size = page_size.max(1);
            self
        }

        /// Makes every write addressed by `key_path` fail with a CRM error
        pub fn with_failing_key(mut self, key_path: impl Into<String>) -> Self {
            self.failing_keys.insert(key_path.into());
            self
        }

        /// Stores a tooling API object at `path`
        pub fn with_tooling_object(mut self, path: impl Into<String>, object: Value) -> Self {
            self.tooling_objects.get_mut().insert(path.into(), object);
            self
        }

        /// Every call received so far, in order
        pub async fn calls(&self) -> Vec<CrmCall> {
            self.calls.lock().await.clone()
        }

        /// Number of received calls matching `predicate`
        pub async fn count_calls(&self, predicate: impl Fn(&CrmCall) -> bool) -> usize {
            self.calls.lock().await.iter().filter(|c| predicate(c)).count()
        }

        /// Snapshot of the stored records of a datatype
        pub async fn stored(&self, datatype: &str) -> Vec<Record> {
            self.records
                .read()
                .await
                .get(datatype)
                .cloned()
                .unwrap_or_default()
        }

        /// Current tooling object at `path`
        pub async fn tooling_object(&self, path: &str) -> Option<Value> {
            self.tooling_objects.read().await.get(path).cloned()
        }

        async fn record_call(&self, call: CrmCall) {
            self.calls.lock().await.push(call);
        }

        fn rejected(&self, datatype: &str, key_path: &str) -> Option<PortError> {
            self.failing_keys.contains(key_path).then(|| {
                PortError::crm(
                    400,
                    datatype,
                    serde_json::json!([{"errorCode": "FIELD_CUSTOM_VALIDATION_EXCEPTION", "message": "rejected by mock"}]),
                    format!("mock://sobjects/{}/{}", datatype, key_path),
                )
            })
        }

        // Only `Field = 'literal'` conditions are interpreted; anything else
        // selects every record.
        fn satisfies(record: &Record, condition: Option<&str>) -> bool {
            let Some((field, literal)) = condition.and_then(|c| c.split_once('=')) else {
                return true;
            };
            let field = field.trim();
            if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return true;
            }
            match literal.trim().strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
                Some(expected) if !expected.contains('\'') => {
                    record.key_text(field).as_deref() == Some(expected)
                }
                _ => true,
            }
        }

        fn matches(record: &Record, key: &RecordKey) -> bool {
            record.key_text(key.field()).as_deref() == Some(key.value())
        }

        fn page(&self, mut records: Vec<Record>, cursors: &mut HashMap<String, Vec<Record>>) -> QueryPage {
            let total = records.len() as u64;
            if records.len() <= self.page_size {
                return QueryPage {
                    records,
                    next: None,
                    total_size: Some(total),
                };
            }
            let rest = records.split_off(self.page_size);
            let cursor = format!("mock-cursor-{}", cursors.len() + 1);
            cursors.insert(cursor.clone(), rest);
            QueryPage {
                records,
                next: Some(cursor),
                total_size: Some(total),
            }
        }

        fn write(&self, stored: &mut Vec<Record>, key: &RecordKey, record: &Record) -> bool {
            if let Some(existing) = stored.iter_mut().find(|r| Self::matches(r, key)) {
                for (field, value) in record.iter() {
                    existing.insert(field.clone(), value.clone());
                }
                return false;
            }

            let id = match key {
                RecordKey::Id(id) => id.clone(),
                RecordKey::External { .. } => {
                    format!("MOCK{:014}", self.next_id.fetch_add(1, Ordering::SeqCst))
                }
            };
            let mut created = record.clone();
            created.insert(ID_FIELD.to_string(), Value::String(id));
            created.insert(key.field().to_string(), Value::String(key.value().to_string()));
            stored.push(created);
            true
        }
    }

    impl DomainPort for MockCrmPort {}

    #[async_trait]
    impl CrmPort for MockCrmPort {
        async fn describe(&self, datatype: &str) -> Result<Vec<FieldSchema>, PortError> {
            self.record_call(CrmCall::Describe(datatype.to_string())).await;
            self.schemas
                .read()
                .await
                .get(datatype)
                .cloned()
                .ok_or_else(|| PortError::not_found("sobject", datatype))
        }

        async fn query(&self, query: &SoqlQuery) -> Result<QueryPage, PortError> {
            self.record_call(CrmCall::Query(query.to_soql())).await;

            let modstamp = |r: &Record| {
                r.get_str(SYSTEM_MODSTAMP)
                    .and_then(|s| parse_timestamp(s).ok())
            };

            let mut selected: Vec<Record> = self
                .stored(&query.object)
                .await
                .into_iter()
                .filter(|r| query.include_deleted || !matches!(r.get(IS_DELETED), Some(Value::Bool(true))))
                .filter(|r| match &query.modified_after {
                    Some(since) => modstamp(r).map(|m| m > *since).unwrap_or(false),
                    None => true,
                })
                .filter(|r| Self::satisfies(r, query.condition.as_deref()))
                .collect();
            selected.sort_by_key(|r| modstamp(r));

            let mut cursors = self.cursors.lock().await;
            Ok(self.page(selected, &mut cursors))
        }

        async fn query_more(&self, cursor: &str) -> Result<QueryPage, PortError> {
            self.record_call(CrmCall::QueryMore(cursor.to_string())).await;
            let mut cursors = self.cursors.lock().await;
            let rest = cursors
                .remove(cursor)
                .ok_or_else(|| PortError::not_found("query cursor", cursor))?;
            Ok(self.page(rest, &mut cursors))
        }

        async fn get(&self, datatype: &str, key: &RecordKey) -> Result<Record, PortError> {
            self.record_call(CrmCall::Get {
                datatype: datatype.to_string(),
                key: key.path(),
            })
            .await;
            self.stored(datatype)
                .await
                .into_iter()
                .find(|r| Self::matches(r, key))
                .ok_or_else(|| PortError::not_found(datatype, key))
        }

        async fn upsert(
            &self,
            datatype: &str,
            key: &RecordKey,
            record: &Record,
        ) -> Result<(), PortError> {
            self.record_call(CrmCall::Upsert {
                datatype: datatype.to_string(),
                key: key.path(),
            })
            .await;
            if let Some(error) = self.rejected(datatype, &key.path()) {
                return Err(error);
            }

            let mut records = self.records.write().await;
            let stored = records.entry(datatype.to_string()).or_default();
            if key.is_internal() && !stored.iter().any(|r| Self::matches(r, key)) {
                return Err(PortError::not_found(datatype, key));
            }
            self.write(stored, key, record);
            Ok(())
        }

        async fn delete(&self, datatype: &str, key: &RecordKey) -> Result<DeleteOutcome, PortError> {
            self.record_call(CrmCall::Delete {
                datatype: datatype.to_string(),
                key: key.path(),
            })
            .await;
            if let Some(error) = self.rejected(datatype, &key.path()) {
                return Err(error);
            }

            let mut records = self.records.write().await;
            let stored = records.entry(datatype.to_string()).or_default();
            let before = stored.len();
            stored.retain(|r| !Self::matches(r, key));
            Ok(if stored.len() < before {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::NotFound
            })
        }

        async fn bulk_upsert(
            &self,
            datatype: &str,
            external_id_field: &str,
            rows: &[Record],
        ) -> Result<Vec<BulkRowResult>, PortError> {
            self.record_call(CrmCall::BulkUpsert {
                datatype: datatype.to_string(),
                external_id_field: external_id_field.to_string(),
                rows: rows.len(),
            })
            .await;

            let mut records = self.records.write().await;
            let stored = records.entry(datatype.to_string()).or_default();
            let results = rows
                .iter()
                .map(|row| match row.key_text(external_id_field) {
                    Some(value) => {
                        let key = if external_id_field == ID_FIELD {
                            RecordKey::id(value)
                        } else {
                            RecordKey::external(external_id_field, value)
                        };
                        if self.failing_keys.contains(&key.path()) {
                            return BulkRowResult::failed(serde_json::json!("rejected by mock"));
                        }
                        let created = self.write(stored, &key, row);
                        BulkRowResult::succeeded(key.value(), created)
                    }
                    None => BulkRowResult::failed(serde_json::json!(format!(
                        "missing external id field {}",
                        external_id_field
                    ))),
                })
                .collect();
            Ok(results)
        }

        async fn bulk_delete(
            &self,
            datatype: &str,
            rows: &[Record],
        ) -> Result<Vec<BulkRowResult>, PortError> {
            self.record_call(CrmCall::BulkDelete {
                datatype: datatype.to_string(),
                rows: rows.len(),
            })
            .await;

            let mut records = self.records.write().await;
            let stored = records.entry(datatype.to_string()).or_default();
            let results = rows
                .iter()
                .map(|row| match row.key_text(ID_FIELD) {
                    Some(id) => {
                        let key = RecordKey::id(id.clone());
                        let before = stored.len();
                        stored.retain(|r| !Self::matches(r, &key));
                        if stored.len() < before {
                            BulkRowResult::succeeded(id, false)
                        } else {
                            BulkRowResult::failed(serde_json::json!("ENTITY_IS_DELETED"))
                        }
                    }
                    None => BulkRowResult::failed(serde_json::json!("missing Id")),
                })
                .collect();
            Ok(results)
        }

        async fn tooling(
            &self,
            method: ApiMethod,
            path: &str,
            body: Option<&Value>,
        ) -> Result<Value, PortError> {
            self.record_call(CrmCall::Tooling {
                method,
                path: path.to_string(),
            })
            .await;

            let mut objects = self.tooling_objects.write().await;
            match method {
                ApiMethod::Get => objects
                    .get(path)
                    .cloned()
                    .ok_or_else(|| PortError::not_found("tooling", path)),
                ApiMethod::Delete => objects
                    .remove(path)
                    .map(|_| Value::Null)
                    .ok_or_else(|| PortError::not_found("tooling", path)),
                _ => {
                    let object = body.cloned().unwrap_or(Value::Null);
                    objects.insert(path.to_string(), object);
                    Ok(Value::Null)
                }
            }
        }

        async fn rest(
            &self,
            method: ApiMethod,
            path: &str,
            params: &[(String, String)],
            body: Option<&Value>,
        ) -> Result<Value, PortError> {
            self.record_call(CrmCall::Rest {
                method,
                path: path.to_string(),
            })
            .await;

            let params: serde_json::Map<String, Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            Ok(serde_json::json!({
                "method": method.as_str(),
                "path": path,
                "params": params,
                "body": body.cloned().unwrap_or(Value::Null),
            }))
        }
    }

    /// Mock connector handing out a shared [`MockCrmPort`]
    #[derive(Debug)]
    pub struct MockConnector {
        port: Arc<MockCrmPort>,
        rejected_usernames: HashSet<String>,
        logins: AtomicUsize,
    }

    impl MockConnector {
        pub fn new(port: Arc<MockCrmPort>) -> Self {
            Self {
                port,
                rejected_usernames: HashSet::new(),
                logins: AtomicUsize::new(0),
            }
        }

        /// Makes logins as `username` fail with `PortError::Unauthorized`
        pub fn rejecting(mut self, username: impl Into<String>) -> Self {
            self.rejected_usernames.insert(username.into());
            self
        }

        /// Number of successful logins performed
        pub fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }

        pub fn port(&self) -> &Arc<MockCrmPort> {
            &self.port
        }
    }

    impl DomainPort for MockConnector {}

    #[async_trait]
    impl CrmConnector for MockConnector {
        async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn CrmPort>, PortError> {
            if self.rejected_usernames.contains(&credentials.username) {
                return Err(PortError::unauthorized("INVALID_LOGIN: Invalid username, password, security token"));
            }
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(self.port.clone())
        }
    }
}
