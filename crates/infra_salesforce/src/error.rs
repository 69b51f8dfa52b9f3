//! HTTP error mapping
//!
//! Salesforce answers errors with a JSON array of `{errorCode, message}`
//! objects. Every non-2xx response becomes a [`PortError::Crm`] carrying
//! that body verbatim, except `404` which becomes [`PortError::NotFound`].

use reqwest::{Response, StatusCode};
use serde_json::Value;

use core_kernel::PortError;

/// Maps a reqwest failure to a port error
pub(crate) fn transport_error(operation: &str, error: reqwest::Error) -> PortError {
    if error.is_timeout() {
        return PortError::Timeout {
            operation: operation.to_string(),
            duration_ms: 0,
        };
    }
    PortError::Connection {
        message: format!("{} failed: {}", operation, error),
        source: Some(Box::new(error)),
    }
}

/// Parses a response body as JSON, falling back to the raw text
pub(crate) fn body_content(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Passes successful responses through and converts the rest
pub(crate) async fn check(response: Response, resource_name: &str) -> Result<Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let content = body_content(response.text().await.unwrap_or_default());
    if status == StatusCode::NOT_FOUND {
        return Err(PortError::not_found(resource_name, url));
    }
    Err(PortError::crm(status.as_u16(), resource_name, content, url))
}

/// Reads a successful response as JSON; empty bodies read as `null`
pub(crate) async fn json_body(response: Response, operation: &str) -> Result<Value, PortError> {
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| PortError::transformation(format!("{}: invalid JSON response: {}", operation, e)))
}
