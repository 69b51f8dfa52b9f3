//! API middleware

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use domain_sync::{Credentials, Instance};

use crate::error::ApiError;
use crate::AppState;

/// Response header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Credentials supplied with the current request, if any
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials(pub Option<Credentials>);

impl RequestCredentials {
    pub fn get(&self) -> Option<&Credentials> {
        self.0.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct InstanceParam {
    instance: Option<String>,
}

/// Decodes an `Authorization: Basic` header value into `(username, password)`
pub fn decode_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Authentication middleware
///
/// Reads basic-auth credentials (`SECURITY_TOKEN\USERNAME` as the username)
/// into the request extensions. Requests without credentials pass only when
/// default credentials are configured.
pub async fn credentials_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let credentials = match header {
        Some(value) => {
            let (username, password) = decode_basic_auth(value).ok_or_else(|| {
                warn!("Malformed Authorization header");
                ApiError::Unauthorized("malformed basic auth header".to_string())
            })?;
            let instance = Query::<InstanceParam>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(param)| param.instance)
                .map(|s| s.parse::<Instance>().unwrap_or_default())
                .unwrap_or_else(|| state.config.instance());
            let credentials = Credentials::from_basic_auth(&username, &password)
                .map_err(|e| ApiError::Unauthorized(e.to_string()))?
                .with_instance(instance);
            Some(credentials)
        }
        None if state.sync.sessions().defaults().is_configured() => None,
        None => {
            warn!("Missing credentials and no defaults configured");
            return Err(ApiError::Unauthorized("no credentials".to_string()));
        }
    };

    request
        .extensions_mut()
        .insert(RequestCredentials(credentials));
    Ok(next.run(request).await)
}

/// Audit logging middleware
///
/// Logs every request with a generated request id, echoed back in the
/// `x-request-id` response header.
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user = request
        .extensions()
        .get::<RequestCredentials>()
        .and_then(|c| c.get())
        .map(|c| c.username.clone())
        .or_else(|| state.sync.sessions().defaults().default_username().map(str::to_string))
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Utc::now();

    let mut response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        user = %user,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
