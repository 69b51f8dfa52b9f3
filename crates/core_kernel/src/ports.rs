//! Ports and Adapters Infrastructure
//!
//! This module provides the error and outcome types shared by every CRM
//! adapter. The port trait itself lives in the sync domain; adapters (the
//! Salesforce REST transport, the in-memory mock) report failures through
//! [`PortError`] so the engine can treat them uniformly.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Sync engine (domain_sync)                  │
//! │   extraction, normalization, write dispatch, bulk batching   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CrmPort trait                          │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │ Salesforce REST / │     │  In-memory mock  │
//!         │ Bulk transport    │     │  (tests)         │
//!         └───────────────────┘     └──────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure reported by the CRM itself
///
/// Preserves what the CRM said so it can be relayed verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmFailure {
    /// HTTP status reported by the CRM
    #[serde(skip)]
    pub status: u16,
    /// The resource (datatype or API area) the request addressed
    pub resource_name: String,
    /// The CRM's response body, JSON when the CRM returned JSON
    pub content: serde_json::Value,
    /// The request URL
    pub url: String,
}

impl fmt::Display for CrmFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} returned {} for {}: {}",
            self.resource_name, self.status, self.url, self.content
        )
    }
}

/// Error type for port operations
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity or datatype was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// The CRM rejected the credentials or the session
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
    },

    /// The CRM answered with an error status
    #[error("CRM error: {0}")]
    Crm(CrmFailure),

    /// Connection to the CRM failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// A response could not be decoded
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates an Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        PortError::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a CRM error from its parts
    pub fn crm(
        status: u16,
        resource_name: impl Into<String>,
        content: serde_json::Value,
        url: impl Into<String>,
    ) -> Self {
        PortError::Crm(CrmFailure {
            status,
            resource_name: resource_name.into(),
            content,
            url: url.into(),
        })
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a Transformation error
    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Outcome of a delete request
///
/// A missing record is an expected outcome of an idempotent delete, not an
/// error, so it is reported as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Marker trait for all domain ports
///
/// All port traits extend this marker so they are thread-safe and can be
/// shared across request tasks.
pub trait DomainPort: Send + Sync + 'static {}
