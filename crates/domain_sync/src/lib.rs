//! Sync Domain
//!
//! This crate is the engine of the connector. It turns "read since" and
//! "write these records" requests into CRM calls and shapes what comes back
//! into a uniform feed.
//!
//! # Components
//!
//! - **Session Manager**: one logged-in CRM client per process, refreshed
//!   after a configurable interval
//! - **Schema Cache**: describe results, fetched once per datatype
//! - **Normalizer**: `_id`, `_updated`, `_deleted` and transit datetimes
//! - **Extraction**: incremental, paged reads streamed record by record
//! - **Write Dispatcher**: per-record or bulk writes with identity resolution
//! - **Bulk Batcher**: partitioned, chunked bulk jobs
//! - **Value sets**: picklist values through the tooling API
//!
//! # Examples
//!
//! ```rust
//! use domain_sync::dispatcher::{records_from_payload, Operation};
//! use serde_json::json;
//!
//! let records = records_from_payload(json!([
//!     {"Id": "001xx000003DGb1", "Name": "Acme"},
//!     {"External__c": "E-42", "_deleted": true}
//! ])).unwrap();
//!
//! assert_eq!(Operation::Upsert.effective_for(&records[0]), Operation::Upsert);
//! assert_eq!(Operation::Upsert.effective_for(&records[1]), Operation::Delete);
//! ```

pub mod error;
pub mod query;
pub mod ports;
pub mod session;
pub mod schema;
pub mod normalizer;
pub mod extraction;
pub mod dispatcher;
pub mod bulk;
pub mod valueset;
pub mod service;

pub use error::SyncError;
pub use query::SoqlQuery;
pub use ports::{ApiMethod, BulkRowResult, CrmConnector, CrmPort, QueryPage, SObject};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{CrmCall, MockConnector, MockCrmPort};
pub use session::{CredentialDefaults, Credentials, Instance, LoginConfig, Session, SessionManager};
pub use schema::SchemaCache;
pub use normalizer::{normalize, normalize_untyped};
pub use extraction::{ExtractFilters, RecordStream};
pub use dispatcher::{Operation, WriteDispatcher, WriteSummary};
pub use bulk::{BulkBatcher, BulkReport, MAX_BATCH_SIZE};
pub use valueset::{ValueSetAliases, ValueSetKind, ValueSetTarget};
pub use service::{SharedSyncService, SyncService};
