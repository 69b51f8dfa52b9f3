//! Core Kernel - Foundational types for the Salesforce sync connector
//!
//! This crate provides the building blocks shared by the sync engine, the
//! CRM transport and the HTTP surface:
//! - Records as ordered maps of JSON values, and the describe field schema
//! - Transit datetime encoding (`~t` tagged timestamps)
//! - Record identity keys and identity resolution
//! - Per-datatype configuration (external id priority, bulk thresholds)
//! - Port error types shared by every CRM adapter

pub mod record;
pub mod temporal;
pub mod identifiers;
pub mod registry;
pub mod ports;
pub mod error;

pub use record::{Record, FieldSchema, INTERNAL_FIELD_PREFIX};
pub use temporal::{TemporalError, TRANSIT_TAG};
pub use identifiers::{RecordKey, resolve_identity, ID_FIELD};
pub use registry::{DatatypeConfig, DatatypeRegistry};
pub use ports::{PortError, CrmFailure, DeleteOutcome, DomainPort};
pub use error::CoreError;
