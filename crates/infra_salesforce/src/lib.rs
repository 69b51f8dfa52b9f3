//! Salesforce Transport
//!
//! This crate provides the production adapters behind the sync domain's
//! ports, talking to Salesforce over HTTP with reqwest.
//!
//! # Components
//!
//! - [`SalesforceConnector`] logs in through the SOAP partner API
//! - [`SalesforceClient`] implements `CrmPort` over the REST API
//! - Bulk API v1 jobs back the `bulk_upsert` and `bulk_delete` operations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_salesforce::{SalesforceConfig, SalesforceConnector};
//! use domain_sync::{CredentialDefaults, SessionManager};
//! use std::sync::Arc;
//!
//! let connector = SalesforceConnector::new(SalesforceConfig::default())?;
//! let sessions = SessionManager::new(
//!     Arc::new(connector),
//!     CredentialDefaults::default(),
//!     chrono::Duration::minutes(45),
//! );
//! ```

pub mod bulk;
pub mod client;
pub mod config;
pub mod connector;
mod error;
pub mod login;

pub use bulk::{BatchState, BulkOperation};
pub use client::SalesforceClient;
pub use config::{SalesforceConfig, PRODUCTION_LOGIN_URL, SANDBOX_LOGIN_URL};
pub use connector::SalesforceConnector;
pub use login::LoginSession;
