//! Kernel errors

use thiserror::Error;
use crate::temporal::TemporalError;

/// Failures raised by kernel logic before any CRM call is made
#[derive(Debug, Error)]
pub enum CoreError {
    /// A datetime could not be read
    #[error("invalid datetime: {0}")]
    Temporal(#[from] TemporalError),

    /// A record or request value is unusable as given
    #[error("{0}")]
    Validation(String),

    /// A JSON configuration document is malformed
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
