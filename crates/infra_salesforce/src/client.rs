//! Salesforce REST Adapter
//!
//! This module provides the connected client implementing [`CrmPort`] on
//! top of the Salesforce REST API.
//!
//! # Overview
//!
//! The `SalesforceClient` holds one authenticated session. Requests go to
//! the versioned data root `{instance}/services/data/v{version}`:
//!
//! - `sobjects/{datatype}/describe` for field metadata
//! - `queryAll` (or `query`) for SOQL, followed by `nextRecordsUrl` pages
//! - `sobjects/{datatype}/{key}` for keyed reads and writes
//! - `tooling/...` and arbitrary paths for the passthrough calls
//!
//! Bulk jobs live in [`crate::bulk`].
//!
//! # Error Handling
//!
//! Non-2xx responses are translated to `PortError` variants:
//! - `404` -> `PortError::NotFound` (a delete reports `DeleteOutcome::NotFound`)
//! - any other status -> `PortError::Crm` carrying the response body
//! - transport failures -> `PortError::Connection` or `PortError::Timeout`

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use core_kernel::{DeleteOutcome, DomainPort, FieldSchema, PortError, Record, RecordKey};
use domain_sync::{ApiMethod, BulkRowResult, CrmPort, QueryPage, SoqlQuery};

use crate::bulk::BulkOperation;
use crate::config::SalesforceConfig;
use crate::error::{check, json_body, transport_error};
use crate::login::LoginSession;

/// Raw query response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    total_size: Option<u64>,
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    next_records_url: Option<String>,
}

impl From<QueryResponse> for QueryPage {
    fn from(response: QueryResponse) -> Self {
        QueryPage {
            records: response.records,
            next: response.next_records_url,
            total_size: response.total_size,
        }
    }
}

/// Raw describe response; only the field list is kept
#[derive(Debug, Deserialize)]
struct DescribeResponse {
    fields: Vec<FieldSchema>,
}

/// A client connected to one Salesforce organization
#[derive(Debug, Clone)]
pub struct SalesforceClient {
    pub(crate) http: Client,
    pub(crate) session: LoginSession,
    pub(crate) config: SalesforceConfig,
}

impl SalesforceClient {
    /// Creates a client for an established session
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client
    /// * `session` - Session returned by the SOAP login
    /// * `config` - Transport configuration
    pub fn new(http: Client, session: LoginSession, config: SalesforceConfig) -> Self {
        Self {
            http,
            session,
            config,
        }
    }

    pub fn instance_url(&self) -> &str {
        &self.session.instance_url
    }

    /// Builds a URL below `{instance}/{root}` from path segments
    pub(crate) fn url_under(&self, root: &str, path: &str) -> Result<Url, PortError> {
        let base = format!("{}/{}", self.session.instance_url, root);
        let mut url = Url::parse(&base)
            .map_err(|e| PortError::internal(format!("invalid instance url {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| PortError::internal(format!("instance url {} cannot take a path", base)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// URL below the versioned REST data root
    fn data_url(&self, path: &str) -> Result<Url, PortError> {
        self.url_under(&format!("services/data/v{}", self.config.api_version), path)
    }

    fn sobject_url(&self, datatype: &str, key: &RecordKey) -> Result<Url, PortError> {
        let mut url = self.data_url("sobjects")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| PortError::internal("instance url cannot take a path"))?;
            segments.push(datatype);
            if let RecordKey::External { field, .. } = key {
                segments.push(field);
            }
            segments.push(key.value());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.session.session_id)
    }

    /// Sends a request and reads the JSON answer
    async fn send_json(
        &self,
        request: RequestBuilder,
        resource_name: &str,
    ) -> Result<Value, PortError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(resource_name, e))?;
        let response = check(response, resource_name).await?;
        json_body(response, resource_name).await
    }

    async fn fetch_page(&self, url: Url) -> Result<QueryPage, PortError> {
        let body = self.send_json(self.request(Method::GET, url), "query").await?;
        let response: QueryResponse = serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("query response: {}", e)))?;
        debug!(
            records = response.records.len(),
            more = response.next_records_url.is_some(),
            "fetched query page"
        );
        Ok(response.into())
    }

    /// Forwards a passthrough call
    async fn passthrough(
        &self,
        method: ApiMethod,
        mut url: Url,
        params: &[(String, String)],
        body: Option<&Value>,
        resource_name: &str,
    ) -> Result<Value, PortError> {
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        let mut request = self.request(http_method(method), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send_json(request, resource_name).await
    }
}

fn http_method(method: ApiMethod) -> Method {
    match method {
        ApiMethod::Get => Method::GET,
        ApiMethod::Post => Method::POST,
        ApiMethod::Put => Method::PUT,
        ApiMethod::Patch => Method::PATCH,
        ApiMethod::Delete => Method::DELETE,
    }
}

impl DomainPort for SalesforceClient {}

#[async_trait]
impl CrmPort for SalesforceClient {
    #[instrument(skip(self))]
    async fn describe(&self, datatype: &str) -> Result<Vec<FieldSchema>, PortError> {
        let url = self.data_url(&format!("sobjects/{}/describe", datatype))?;
        let body = self
            .send_json(self.request(Method::GET, url), datatype)
            .await
            .map_err(|e| match e {
                PortError::NotFound { .. } => PortError::not_found("sobject", datatype),
                other => other,
            })?;
        let describe: DescribeResponse = serde_json::from_value(body)
            .map_err(|e| PortError::transformation(format!("describe {}: {}", datatype, e)))?;
        Ok(describe.fields)
    }

    #[instrument(skip(self, query), fields(object = %query.object))]
    async fn query(&self, query: &SoqlQuery) -> Result<QueryPage, PortError> {
        let endpoint = if query.include_deleted { "queryAll" } else { "query" };
        let mut url = self.data_url(endpoint)?;
        url.query_pairs_mut().append_pair("q", &query.to_soql());
        self.fetch_page(url).await
    }

    #[instrument(skip(self))]
    async fn query_more(&self, cursor: &str) -> Result<QueryPage, PortError> {
        let url = Url::parse(&self.session.instance_url)
            .and_then(|base| base.join(cursor))
            .map_err(|e| PortError::internal(format!("invalid query cursor {}: {}", cursor, e)))?;
        self.fetch_page(url).await
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, datatype: &str, key: &RecordKey) -> Result<Record, PortError> {
        let url = self.sobject_url(datatype, key)?;
        let body = self
            .send_json(self.request(Method::GET, url), datatype)
            .await
            .map_err(|e| match e {
                PortError::NotFound { .. } => PortError::not_found(datatype, key),
                other => other,
            })?;
        Record::from_value(body)
            .ok_or_else(|| PortError::transformation(format!("{} {} is not an object", datatype, key)))
    }

    #[instrument(skip(self, record), fields(key = %key))]
    async fn upsert(
        &self,
        datatype: &str,
        key: &RecordKey,
        record: &Record,
    ) -> Result<(), PortError> {
        let url = self.sobject_url(datatype, key)?;
        self.send_json(self.request(Method::PATCH, url).json(record), datatype)
            .await
            .map_err(|e| match e {
                PortError::NotFound { .. } => PortError::not_found(datatype, key),
                other => other,
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, datatype: &str, key: &RecordKey) -> Result<DeleteOutcome, PortError> {
        let url = self.sobject_url(datatype, key)?;
        match self.send_json(self.request(Method::DELETE, url), datatype).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(PortError::NotFound { .. }) => {
                debug!("record already absent");
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn bulk_upsert(
        &self,
        datatype: &str,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError> {
        self.run_bulk_job(BulkOperation::Upsert, datatype, Some(external_id_field), records)
            .await
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn bulk_delete(
        &self,
        datatype: &str,
        records: &[Record],
    ) -> Result<Vec<BulkRowResult>, PortError> {
        self.run_bulk_job(BulkOperation::Delete, datatype, None, records)
            .await
    }

    #[instrument(skip(self, body))]
    async fn tooling(
        &self,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PortError> {
        let url = self.data_url(&format!("tooling/{}", path))?;
        self.passthrough(method, url, &[], body, "tooling").await
    }

    #[instrument(skip(self, params, body))]
    async fn rest(
        &self,
        method: ApiMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, PortError> {
        let url = self.data_url(path)?;
        self.passthrough(method, url, params, body, "rest").await
    }
}
