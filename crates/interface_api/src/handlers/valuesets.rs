//! Value set handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use domain_sync::ValueSetTarget;

use crate::error::ApiError;
use crate::handlers::required_json;
use crate::middleware::RequestCredentials;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RefineParams {
    pub do_refine: Option<String>,
}

impl RefineParams {
    /// Refinement is on unless explicitly disabled with `0`, `false` or `no`
    pub fn refine(&self) -> bool {
        match self.do_refine.as_deref() {
            Some(flag) => !matches!(flag.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
            None => true,
        }
    }
}

async fn read(
    state: &AppState,
    credentials: &RequestCredentials,
    target: ValueSetTarget,
    params: &RefineParams,
) -> Result<Json<Vec<Value>>, ApiError> {
    let items = state
        .sync
        .value_sets(credentials.get(), &target, params.refine())
        .await?;
    Ok(Json(items))
}

async fn update(
    state: &AppState,
    credentials: &RequestCredentials,
    target: ValueSetTarget,
    body: &Bytes,
) -> Result<Json<Value>, ApiError> {
    let items = match required_json(body)? {
        Value::Array(items) => items,
        item => vec![item],
    };
    let updated = state
        .sync
        .update_value_sets(credentials.get(), &target, items)
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// `GET /ValueSet`
pub async fn list_value_sets(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Query(params): Query<RefineParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    read(&state, &credentials, ValueSetTarget::All, &params).await
}

/// `GET /ValueSet/CustomField/:id`
pub async fn get_custom_field(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(id): Path<String>,
    Query(params): Query<RefineParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let target = ValueSetTarget::Path(format!("/CustomField/{}", id));
    read(&state, &credentials, target, &params).await
}

/// `GET /ValueSet/GlobalValueSet/:id`
pub async fn get_global_value_set(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(id): Path<String>,
    Query(params): Query<RefineParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let target = ValueSetTarget::Path(format!("/GlobalValueSet/{}", id));
    read(&state, &credentials, target, &params).await
}

/// `GET /ValueSet/SesamAlias/:alias`
pub async fn get_by_alias(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(alias): Path<String>,
    Query(params): Query<RefineParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    read(&state, &credentials, ValueSetTarget::Alias(alias), &params).await
}

/// `POST /ValueSet`; each item names its own `path`
pub async fn update_value_sets(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    update(&state, &credentials, ValueSetTarget::All, &body).await
}

/// `POST /ValueSet/CustomField/:id`
pub async fn update_custom_field(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let target = ValueSetTarget::Path(format!("/CustomField/{}", id));
    update(&state, &credentials, target, &body).await
}

/// `POST /ValueSet/GlobalValueSet/:id`
pub async fn update_global_value_set(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let target = ValueSetTarget::Path(format!("/GlobalValueSet/{}", id));
    update(&state, &credentials, target, &body).await
}

/// `POST /ValueSet/SesamAlias/:alias`
pub async fn update_by_alias(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(alias): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    update(&state, &credentials, ValueSetTarget::Alias(alias), &body).await
}
