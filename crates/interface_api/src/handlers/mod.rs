//! Request handlers

pub mod datatypes;
pub mod health;
pub mod passthrough;
pub mod valuesets;

use axum::body::Bytes;
use serde_json::Value;

use crate::error::ApiError;

/// Parses an optional JSON request body; an empty body reads as `None`
pub(crate) fn optional_json(body: &Bytes) -> Result<Option<Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(ApiError::bad_payload)
}

/// Parses a required JSON request body
pub(crate) fn required_json(body: &Bytes) -> Result<Value, ApiError> {
    optional_json(body)?.ok_or_else(|| ApiError::bad_payload("empty body"))
}
