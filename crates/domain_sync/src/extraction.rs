//! Incremental record extraction
//!
//! A collection read queries every described field of the datatype with
//! `queryAll` semantics, so soft-deleted records are reported with
//! `_deleted: true`, ordered ascending by modification stamp. The first
//! page is fetched before the stream is handed out so that query errors
//! surface before any output is produced; later pages are fetched only as
//! the consumer drains the stream.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

use core_kernel::temporal::parse_timestamp;
use core_kernel::{FieldSchema, Record, RecordKey};

use crate::error::SyncError;
use crate::normalizer::normalize;
use crate::ports::{CrmPort, QueryPage};
use crate::query::SoqlQuery;
use crate::schema::SchemaCache;

/// Stream of normalized records
pub type RecordStream = BoxStream<'static, Result<Record, SyncError>>;

/// Filters of a collection read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractFilters {
    /// Only records modified strictly after this timestamp
    pub since: Option<String>,
    /// Raw SOQL condition
    pub condition: Option<String>,
}

impl ExtractFilters {
    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Builds the extraction query for `datatype`
    ///
    /// # Errors
    ///
    /// `SyncError::Validation` when `since` is not a recognizable timestamp.
    pub fn to_query(&self, datatype: &str, fields: &[FieldSchema]) -> Result<SoqlQuery, SyncError> {
        let mut query = SoqlQuery::new(datatype, fields.iter().map(|f| f.name.clone()));

        if let Some(since) = self.since.as_deref().filter(|s| !s.trim().is_empty()) {
            let since = parse_timestamp(since)
                .map_err(|_| SyncError::validation(format!("invalid since value '{}'", since)))?;
            query = query.modified_after(since);
        }
        if let Some(condition) = &self.condition {
            query = query.condition(condition.clone());
        }
        Ok(query)
    }
}

/// Reads records of `datatype`
///
/// With a `key`, yields exactly the one record it addresses. Without, yields
/// every record matching `filters`.
///
/// # Errors
///
/// - `SyncError::NotFound` for an unknown datatype or a key matching nothing
/// - `SyncError::Validation` for an unparseable `since`
/// - `SyncError::Crm` when the CRM rejects the query
pub async fn extract(
    client: Arc<dyn CrmPort>,
    schema: &SchemaCache,
    datatype: &str,
    filters: &ExtractFilters,
    key: Option<&RecordKey>,
) -> Result<RecordStream, SyncError> {
    let fields = schema.ensure_fields(client.as_ref(), datatype).await?;

    if let Some(key) = key {
        let raw = client.resource(datatype).get(key).await?;
        let record = normalize(&fields, raw);
        return Ok(stream::once(async move { Ok(record) }).boxed());
    }

    let query = filters.to_query(datatype, &fields)?;
    debug!(datatype, soql = %query.to_soql(), "extracting records");
    let first = client.query(&query).await?;
    debug!(
        datatype,
        total = ?first.total_size,
        paged = !first.is_last(),
        "first page received"
    );

    Ok(page_stream(client, fields, first))
}

enum Cursor {
    Fetched(QueryPage),
    Pending(String),
    Exhausted,
}

fn page_stream(client: Arc<dyn CrmPort>, fields: Arc<[FieldSchema]>, first: QueryPage) -> RecordStream {
    let pages = stream::try_unfold(Cursor::Fetched(first), move |cursor| {
        let client = client.clone();
        async move {
            let page = match cursor {
                Cursor::Fetched(page) => page,
                Cursor::Pending(next) => client.query_more(&next).await.map_err(SyncError::from)?,
                Cursor::Exhausted => return Ok::<_, SyncError>(None),
            };
            let following = match page.next {
                Some(next) => Cursor::Pending(next),
                None => Cursor::Exhausted,
            };
            Ok(Some((page.records, following)))
        }
    });

    pages
        .map_ok(move |records| {
            let fields = fields.clone();
            stream::iter(
                records
                    .into_iter()
                    .map(move |raw| Ok::<_, SyncError>(normalize(&fields, raw))),
            )
        })
        .try_flatten()
        .boxed()
}
