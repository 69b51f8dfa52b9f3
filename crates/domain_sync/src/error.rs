//! Sync domain errors
//!
//! Every failure surfaced by the sync engine falls into one of five kinds.
//! The HTTP layer maps each kind to a status code and, for CRM failures,
//! relays the CRM's own response body.

use thiserror::Error;

use core_kernel::{CoreError, CrmFailure, PortError};

/// Errors that can occur while syncing with the CRM
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable credentials, or the CRM rejected them
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Unknown datatype, or a keyed read found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The CRM answered with an error status
    #[error("CRM error: {0}")]
    Crm(CrmFailure),

    /// The request could not be interpreted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Anything else
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SyncError {
    pub fn authentication(message: impl Into<String>) -> Self {
        SyncError::Authentication(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SyncError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        SyncError::Unexpected(message.into())
    }
}

impl From<PortError> for SyncError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => {
                SyncError::NotFound(format!("{} {}", entity_type, id))
            }
            PortError::Unauthorized { message } => SyncError::Authentication(message),
            PortError::Crm(failure) => SyncError::Crm(failure),
            other => SyncError::Unexpected(other.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(message) => SyncError::Validation(message),
            CoreError::Temporal(e) => SyncError::Validation(e.to_string()),
            CoreError::Configuration(message) => SyncError::Unexpected(message),
        }
    }
}
