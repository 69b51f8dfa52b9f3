//! Tooling and REST API passthrough

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    Extension, Json,
};
use serde_json::Value;

use domain_sync::ApiMethod;

use crate::error::ApiError;
use crate::handlers::optional_json;
use crate::middleware::RequestCredentials;
use crate::AppState;

fn api_method(method: &Method) -> Result<ApiMethod, ApiError> {
    match *method {
        Method::GET => Ok(ApiMethod::Get),
        Method::POST => Ok(ApiMethod::Post),
        Method::PUT => Ok(ApiMethod::Put),
        Method::PATCH => Ok(ApiMethod::Patch),
        Method::DELETE => Ok(ApiMethod::Delete),
        ref other => Err(ApiError::Validation(format!("unsupported method {}", other))),
    }
}

/// `/sf/tooling/*path`
pub async fn tooling(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    method: Method,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = optional_json(&body)?;
    let response = state
        .sync
        .tooling(credentials.get(), api_method(&method)?, &path, body.as_ref())
        .await?;
    Ok(Json(response))
}

/// `/sf/rest/*path`; query parameters are forwarded
pub async fn rest(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    method: Method,
    Path(path): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = optional_json(&body)?;
    let response = state
        .sync
        .rest(
            credentials.get(),
            api_method(&method)?,
            &path,
            &params,
            body.as_ref(),
        )
        .await?;
    Ok(Json(response))
}
