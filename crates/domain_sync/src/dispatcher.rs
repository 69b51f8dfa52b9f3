//! Write dispatch
//!
//! Routes a batch of inbound records either to the per-record REST calls or,
//! above the datatype's bulk threshold, to the [`BulkBatcher`]. Per-record
//! upserts fail fast; per-record deletes keep going past missing or failing
//! records.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use core_kernel::{resolve_identity, DatatypeRegistry, DeleteOutcome, Record, RecordKey, ID_FIELD};

use crate::bulk::{BulkBatcher, BulkReport};
use crate::error::SyncError;
use crate::ports::CrmPort;

/// Requested write operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Upsert,
    Delete,
}

impl Operation {
    /// `DELETE` deletes, every other method upserts
    pub fn from_method(method: &str) -> Self {
        if method.eq_ignore_ascii_case("DELETE") {
            Operation::Delete
        } else {
            Operation::Upsert
        }
    }

    /// The operation to apply to `record`; `_deleted: true` forces a delete
    pub fn effective_for(self, record: &Record) -> Self {
        if record.is_marked_deleted() {
            Operation::Delete
        } else {
            self
        }
    }
}

/// Outcome of a write call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub upserted: usize,
    pub deleted: usize,
    pub already_absent: usize,
    pub failed: usize,
    /// Whether the bulk path was taken
    pub bulk: bool,
}

impl From<BulkReport> for WriteSummary {
    fn from(report: BulkReport) -> Self {
        Self {
            upserted: report.upserted,
            deleted: report.deleted,
            already_absent: report.already_absent,
            failed: report.failed_rows,
            bulk: true,
        }
    }
}

/// Splits a request body into records
///
/// # Errors
///
/// `SyncError::Validation` unless the body is an object or an array of
/// objects.
pub fn records_from_payload(payload: Value) -> Result<Vec<Record>, SyncError> {
    let items = match payload {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(SyncError::validation(format!(
                "expected a JSON object or array of objects, got {}",
                other
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            Record::from_value(item)
                .ok_or_else(|| SyncError::validation("every entity must be a JSON object"))
        })
        .collect()
}

/// Applies inbound writes for one datatype
#[derive(Debug, Clone, Copy)]
pub struct WriteDispatcher<'a> {
    registry: &'a DatatypeRegistry,
}

impl<'a> WriteDispatcher<'a> {
    pub fn new(registry: &'a DatatypeRegistry) -> Self {
        Self { registry }
    }

    /// Writes `records` to `datatype`
    ///
    /// `key` is the identity addressed by the request path, used for records
    /// that carry neither `Id` nor a configured external id.
    ///
    /// Below the bulk threshold records are written one at a time, in order.
    /// A failed delete is logged, counted in `WriteSummary::failed` and the
    /// remaining records are still written. A failed upsert stops the batch
    /// and is returned as the error, so later records are never sent.
    ///
    /// # Errors
    ///
    /// - `SyncError::Validation` when a record's identity cannot be resolved
    /// - `SyncError::Crm` when an upsert (or a bulk partition) fails
    pub async fn apply(
        &self,
        client: &dyn CrmPort,
        datatype: &str,
        records: Vec<Record>,
        operation: Operation,
        key: Option<&RecordKey>,
    ) -> Result<WriteSummary, SyncError> {
        let key_fields = self.registry.ordered_key_fields(datatype);

        if self.registry.use_bulk(datatype, records.len()) {
            debug!(datatype, count = records.len(), "switching to bulk writes");
            return BulkBatcher::new(key_fields)
                .submit(client, datatype, records, operation)
                .await
                .map(WriteSummary::from);
        }

        let sobject = client.resource(datatype);
        let mut summary = WriteSummary::default();
        for record in records {
            let effective = operation.effective_for(&record);
            let record = record.without_internal();
            let identity = resolve_identity(&record, key_fields, key)?;
            let body = outbound_body(record, &identity);

            match effective {
                Operation::Delete => {
                    debug!(datatype, key = %identity, "deleting record");
                    match sobject.delete(&identity).await {
                        Ok(DeleteOutcome::Deleted) => summary.deleted += 1,
                        Ok(DeleteOutcome::NotFound) => {
                            debug!(datatype, key = %identity, "record to delete was already gone");
                            summary.already_absent += 1;
                        }
                        Err(e) => {
                            warn!(datatype, key = %identity, error = %e, "delete failed");
                            summary.failed += 1;
                        }
                    }
                }
                Operation::Upsert => {
                    debug!(datatype, key = %identity, "upserting record");
                    sobject.upsert(&identity, &body).await?;
                    summary.upserted += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// The record body sent to the CRM: no identity fields
fn outbound_body(mut record: Record, identity: &RecordKey) -> Record {
    record.remove(ID_FIELD);
    record.remove(identity.field());
    record
}
