//! Bulk API v1 jobs
//!
//! A bulk write is a job holding one JSON batch:
//!
//! 1. `POST job` creates the job for an object and operation
//! 2. `POST job/{job}/batch` uploads the rows
//! 3. `POST job/{job}` closes the job
//! 4. `GET job/{job}/batch/{batch}` is polled until the batch settles
//! 5. `GET job/{job}/batch/{batch}/result` returns one result per row
//!
//! The async API authenticates with the `X-SFDC-Session` header instead of
//! a bearer token.

use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use core_kernel::{PortError, Record};
use domain_sync::BulkRowResult;

use crate::client::SalesforceClient;
use crate::error::{check, json_body, transport_error};

const SESSION_HEADER: &str = "X-SFDC-Session";

/// Write operation of a bulk job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperation {
    Upsert,
    Delete,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Upsert => "upsert",
            BulkOperation::Delete => "delete",
        }
    }
}

/// Batch processing state as reported by the async API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    #[serde(rename = "Not Processed", alias = "NotProcessed")]
    NotProcessed,
}

impl BatchState {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Failed | BatchState::NotProcessed
        )
    }
}

#[derive(Debug, Deserialize)]
struct JobInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchInfo {
    id: String,
    state: BatchState,
    #[serde(default)]
    state_message: Option<String>,
}

/// Body of the job creation request
pub(crate) fn job_request(
    operation: BulkOperation,
    datatype: &str,
    external_id_field: Option<&str>,
) -> Value {
    let mut job = json!({
        "operation": operation.as_str(),
        "object": datatype,
        "contentType": "JSON",
        "concurrencyMode": "Serial",
    });
    if let Some(field) = external_id_field {
        job["externalIdFieldName"] = Value::String(field.to_string());
    }
    job
}

impl SalesforceClient {
    fn async_url(&self, path: &str) -> Result<Url, PortError> {
        self.url_under(&format!("services/async/{}", self.config.api_version), path)
    }

    fn bulk_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(SESSION_HEADER, &self.session.session_id)
    }

    async fn bulk_call(&self, request: RequestBuilder, datatype: &str) -> Result<Value, PortError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("bulk", e))?;
        let response = check(response, datatype).await?;
        json_body(response, "bulk").await
    }

    async fn batch_info(&self, job: &str, batch: &str, datatype: &str) -> Result<BatchInfo, PortError> {
        let url = self.async_url(&format!("job/{}/batch/{}", job, batch))?;
        let body = self.bulk_call(self.bulk_request(Method::GET, url), datatype).await?;
        serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("bulk batch info: {}", e)))
    }

    /// Runs one bulk job over `rows` and waits for its per-row results
    pub(crate) async fn run_bulk_job(
        &self,
        operation: BulkOperation,
        datatype: &str,
        external_id_field: Option<&str>,
        rows: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError> {
        let url = self.async_url("job")?;
        let body = self
            .bulk_call(
                self.bulk_request(Method::POST, url)
                    .json(&job_request(operation, datatype, external_id_field)),
                datatype,
            )
            .await?;
        let job: JobInfo = serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("bulk job info: {}", e)))?;

        let url = self.async_url(&format!("job/{}/batch", job.id))?;
        let body = self
            .bulk_call(self.bulk_request(Method::POST, url).json(rows), datatype)
            .await?;
        let batch: BatchInfo = serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("bulk batch info: {}", e)))?;
        info!(job = %job.id, batch = %batch.id, rows = rows.len(), operation = operation.as_str(), "bulk batch submitted");

        let url = self.async_url(&format!("job/{}", job.id))?;
        self.bulk_call(
            self.bulk_request(Method::POST, url).json(&json!({ "state": "Closed" })),
            datatype,
        )
        .await?;

        let deadline = Instant::now() + self.config.bulk_timeout;
        let mut info = batch;
        while !info.state.is_settled() {
            if Instant::now() >= deadline {
                return Err(PortError::Timeout {
                    operation: format!("bulk batch {}", info.id),
                    duration_ms: self.config.bulk_timeout.as_millis() as u64,
                });
            }
            sleep(self.config.bulk_poll_interval).await;
            info = self.batch_info(&job.id, &info.id, datatype).await?;
            debug!(batch = %info.id, state = ?info.state, "polled bulk batch");
        }

        if info.state != BatchState::Completed {
            let message = info.state_message.unwrap_or_default();
            warn!(batch = %info.id, state = ?info.state, %message, "bulk batch did not complete");
            let url = self.async_url(&format!("job/{}/batch/{}", job.id, info.id))?;
            return Err(PortError::crm(
                500,
                datatype,
                json!({ "state": format!("{:?}", info.state), "stateMessage": message }),
                url.to_string(),
            ));
        }

        let url = self.async_url(&format!("job/{}/batch/{}/result", job.id, info.id))?;
        let body = self.bulk_call(self.bulk_request(Method::GET, url), datatype).await?;
        serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("bulk batch results: {}", e)))
    }
}
