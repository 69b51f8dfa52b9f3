//! API error handling

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use core_kernel::CrmFailure;
use domain_sync::SyncError;

/// Body of the basic-auth challenge
pub const CHALLENGE_MESSAGE: &str =
    "Could not verify your access level for that URL.\nYou have to login with proper credentials";

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Relayed verbatim with the CRM's own status
    #[error("{0}")]
    Crm(CrmFailure),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_payload(message: impl std::fmt::Display) -> Self {
        ApiError::Validation(format!("invalid JSON payload: {}", message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, r#"Basic realm="Login Required""#)],
                CHALLENGE_MESSAGE,
            )
                .into_response(),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            ApiError::Crm(failure) => {
                let status = StatusCode::from_u16(failure.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(failure)).into_response()
            }
            ApiError::Validation(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
            ApiError::Internal(message) => {
                error!(%message, "unexpected failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Authentication(message) => ApiError::Unauthorized(message),
            SyncError::NotFound(message) => ApiError::NotFound(message),
            SyncError::Crm(failure) => ApiError::Crm(failure),
            SyncError::Validation(message) => ApiError::Validation(message),
            SyncError::Unexpected(message) => ApiError::Internal(message),
        }
    }
}
