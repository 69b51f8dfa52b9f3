//! Record feed and write receiver handlers
//!
//! `GET /:datatype` streams every record as one JSON array. The array is
//! written record by record as pages arrive from the CRM; a failure after
//! the first byte truncates the body.

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, Method},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use core_kernel::{Record, RecordKey};
use domain_sync::dispatcher::records_from_payload;
use domain_sync::{ExtractFilters, Operation, RecordStream, SyncError, WriteSummary};

use crate::error::ApiError;
use crate::handlers::required_json;
use crate::middleware::RequestCredentials;
use crate::AppState;

/// Query parameters of a collection read
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    pub since: Option<String>,
    #[serde(rename = "where")]
    pub condition: Option<String>,
}

impl From<FeedParams> for ExtractFilters {
    fn from(params: FeedParams) -> Self {
        ExtractFilters {
            since: params.since,
            condition: params.condition,
        }
    }
}

/// Renders a record stream as a chunked JSON array body
pub fn json_array_body(records: RecordStream) -> Body {
    let items = records.enumerate().map(|(index, record)| {
        let record = record.inspect_err(|e| warn!(error = %e, "record feed aborted"))?;
        let mut chunk = if index == 0 { Vec::new() } else { b",\n".to_vec() };
        serde_json::to_writer(&mut chunk, &record)
            .map_err(|e| SyncError::unexpected(format!("failed to encode record: {}", e)))?;
        Ok::<_, SyncError>(Bytes::from(chunk))
    });

    let body = stream::once(async { Ok(Bytes::from_static(b"[")) })
        .chain(items)
        .chain(stream::once(async { Ok(Bytes::from_static(b"]")) }));
    Body::from_stream(body)
}

/// `GET /:datatype`
pub async fn list_records(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path(datatype): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Response, ApiError> {
    let records = state
        .sync
        .extract(credentials.get(), &datatype, &params.into(), None)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        json_array_body(records),
    )
        .into_response())
}

async fn single_record(
    state: &AppState,
    credentials: &RequestCredentials,
    datatype: &str,
    key: RecordKey,
) -> Result<Json<Record>, ApiError> {
    let mut records = state
        .sync
        .extract(credentials.get(), datatype, &ExtractFilters::default(), Some(&key))
        .await?;
    let record = records
        .try_next()
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} {}", datatype, key)))?;
    Ok(Json(record))
}

/// `GET /:datatype/:id`
pub async fn get_record(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path((datatype, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    single_record(&state, &credentials, &datatype, RecordKey::id(id)).await
}

/// `GET /:datatype/:ext_field/:ext_value`
pub async fn get_record_by_external_id(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    Path((datatype, field, value)): Path<(String, String, String)>,
) -> Result<Json<Record>, ApiError> {
    single_record(&state, &credentials, &datatype, RecordKey::external(field, value)).await
}

async fn write(
    state: &AppState,
    credentials: &RequestCredentials,
    method: &Method,
    datatype: &str,
    key: Option<RecordKey>,
    body: &Bytes,
) -> Result<Json<WriteSummary>, ApiError> {
    let records = records_from_payload(required_json(body)?)?;
    let summary = state
        .sync
        .apply(
            credentials.get(),
            datatype,
            records,
            Operation::from_method(method.as_str()),
            key.as_ref(),
        )
        .await?;
    info!(
        datatype,
        upserted = summary.upserted,
        deleted = summary.deleted,
        already_absent = summary.already_absent,
        failed = summary.failed,
        bulk = summary.bulk,
        "write applied"
    );
    Ok(Json(summary))
}

/// `POST|PUT|PATCH|DELETE /:datatype`
pub async fn write_records(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    method: Method,
    Path(datatype): Path<String>,
    body: Bytes,
) -> Result<Json<WriteSummary>, ApiError> {
    write(&state, &credentials, &method, &datatype, None, &body).await
}

/// `POST|PUT|PATCH|DELETE /:datatype/:id`
pub async fn write_record(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    method: Method,
    Path((datatype, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<WriteSummary>, ApiError> {
    write(&state, &credentials, &method, &datatype, Some(RecordKey::id(id)), &body).await
}

/// `POST|PUT|PATCH|DELETE /:datatype/:ext_field/:ext_value`
pub async fn write_record_by_external_id(
    State(state): State<AppState>,
    Extension(credentials): Extension<RequestCredentials>,
    method: Method,
    Path((datatype, field, value)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<WriteSummary>, ApiError> {
    let key = RecordKey::external(field, value);
    write(&state, &credentials, &method, &datatype, Some(key), &body).await
}
