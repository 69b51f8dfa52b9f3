//! Bulk write batching
//!
//! Large writes are grouped by the external id field that identifies each
//! record, then sent to the CRM as bulk jobs of at most [`MAX_BATCH_SIZE`]
//! rows, one after the other. Within a partition:
//!
//! 1. deletes addressed only by an external id go through the single-record
//!    delete call (the bulk delete job only accepts internal ids),
//! 2. deletes carrying an `Id` are sent as a bulk delete job,
//! 3. everything else is sent as a bulk upsert job matched on the
//!    partition's field.
//!
//! A failing partition does not prevent the others from being submitted;
//! the first failure is reported once all of them have been tried.

use tracing::{debug, error, info, warn};

use core_kernel::{DeleteOutcome, Record, RecordKey, ID_FIELD};

use crate::dispatcher::Operation;
use crate::error::SyncError;
use crate::ports::{BulkRowResult, CrmPort, SObject};

/// Maximum number of rows per bulk job batch
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Outcome of a bulk submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Partitions with at least one record
    pub partitions: usize,
    pub upserted: usize,
    pub deleted: usize,
    /// Deletes whose record did not exist
    pub already_absent: usize,
    /// Rows the CRM rejected or that carried no usable key
    pub failed_rows: usize,
    pub failed_partitions: usize,
}

/// Records sharing one identity field
#[derive(Debug, Default)]
struct Partition {
    field: String,
    single_deletes: Vec<RecordKey>,
    bulk_deletes: Vec<Record>,
    upserts: Vec<Record>,
}

impl Partition {
    fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.single_deletes.is_empty() && self.bulk_deletes.is_empty() && self.upserts.is_empty()
    }
}

/// Groups and submits bulk writes for one datatype
#[derive(Debug, Clone, Copy)]
pub struct BulkBatcher<'a> {
    key_fields: &'a [String],
    batch_size: usize,
}

impl<'a> BulkBatcher<'a> {
    /// Creates a batcher trying `key_fields` in order, then `Id`
    pub fn new(key_fields: &'a [String]) -> Self {
        Self {
            key_fields,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Submits `records` as bulk jobs
    ///
    /// # Errors
    ///
    /// The first partition failure, after every partition has been tried.
    pub async fn submit(
        &self,
        client: &dyn CrmPort,
        datatype: &str,
        records: Vec<Record>,
        operation: Operation,
    ) -> Result<BulkReport, SyncError> {
        let mut report = BulkReport::default();
        let partitions = self.partition(records, operation, &mut report);
        let sobject = client.resource(datatype);
        let mut first_failure = None;

        for partition in partitions.iter().filter(|p| !p.is_empty()) {
            report.partitions += 1;
            debug!(
                datatype,
                field = %partition.field,
                single_deletes = partition.single_deletes.len(),
                bulk_deletes = partition.bulk_deletes.len(),
                upserts = partition.upserts.len(),
                "submitting bulk partition"
            );

            if let Err(e) = self
                .submit_partition(sobject, partition, &mut report)
                .await
            {
                error!(datatype, field = %partition.field, error = %e, "bulk partition failed");
                report.failed_partitions += 1;
                first_failure.get_or_insert(e);
            }
        }

        info!(
            datatype,
            partitions = report.partitions,
            upserted = report.upserted,
            deleted = report.deleted,
            failed_rows = report.failed_rows,
            "bulk write finished"
        );
        match first_failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn partition(&self, records: Vec<Record>, operation: Operation, report: &mut BulkReport) -> Vec<Partition> {
        let mut partitions: Vec<Partition> = self
            .key_fields
            .iter()
            .map(|field| Partition::new(field.as_str()))
            .chain(std::iter::once(Partition::new(ID_FIELD)))
            .collect();
        let id_partition = partitions.len() - 1;

        for record in records {
            let effective = operation.effective_for(&record);
            let slot = self
                .key_fields
                .iter()
                .position(|field| record.key_text(field).is_some())
                .unwrap_or(id_partition);
            let partition = &mut partitions[slot];

            match effective {
                Operation::Delete => match record.key_text(ID_FIELD) {
                    Some(id) => partition
                        .bulk_deletes
                        .push(Record::new().with(ID_FIELD, id)),
                    None => match record.key_text(&partition.field) {
                        Some(value) => partition
                            .single_deletes
                            .push(RecordKey::external(partition.field.clone(), value)),
                        None => {
                            warn!("skipping delete of a record without any key");
                            report.failed_rows += 1;
                        }
                    },
                },
                Operation::Upsert => partition.upserts.push(record.without_internal()),
            }
        }
        partitions
    }

    async fn submit_partition(
        &self,
        sobject: SObject<'_>,
        partition: &Partition,
        report: &mut BulkReport,
    ) -> Result<(), SyncError> {
        let datatype = sobject.datatype();
        for key in &partition.single_deletes {
            match sobject.delete(key).await {
                Ok(DeleteOutcome::Deleted) => report.deleted += 1,
                Ok(DeleteOutcome::NotFound) => {
                    debug!(datatype, key = %key, "record to delete was already gone");
                    report.already_absent += 1;
                }
                Err(e) => {
                    warn!(datatype, key = %key, error = %e, "delete failed");
                    report.failed_rows += 1;
                }
            }
        }

        for chunk in partition.bulk_deletes.chunks(self.batch_size) {
            let results = sobject.bulk_delete(chunk).await?;
            let (succeeded, failed) = tally(datatype, "delete", &results);
            report.deleted += succeeded;
            report.failed_rows += failed;
        }

        for chunk in partition.upserts.chunks(self.batch_size) {
            let results = sobject.bulk_upsert(&partition.field, chunk).await?;
            let (succeeded, failed) = tally(datatype, "upsert", &results);
            report.upserted += succeeded;
            report.failed_rows += failed;
        }
        Ok(())
    }
}

fn tally(datatype: &str, action: &str, results: &[BulkRowResult]) -> (usize, usize) {
    let failed: Vec<&BulkRowResult> = results.iter().filter(|r| !r.success).collect();
    if let Some(first) = failed.first() {
        warn!(
            datatype,
            action,
            failed = failed.len(),
            first_error = %first.errors.first().unwrap_or(&serde_json::Value::Null),
            "bulk rows rejected"
        );
    }
    (results.len() - failed.len(), failed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{CrmCall, MockCrmPort};

    fn keys(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partitions_by_first_present_key_field() {
        let port = MockCrmPort::new();
        let key_fields = keys(&["External__c", "Legacy__c"]);
        let records = vec![
            Record::new().with("External__c", "E1").with("Legacy__c", "L1"),
            Record::new().with("Legacy__c", "L2"),
            Record::new().with("Id", "001").with("Name", "by id"),
        ];

        let report = BulkBatcher::new(&key_fields)
            .submit(&port, "Account", records, Operation::Upsert)
            .await
            .unwrap();

        assert_eq!(report.partitions, 3);
        assert_eq!(report.upserted, 3);
        let fields: Vec<String> = port
            .calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                CrmCall::BulkUpsert { external_id_field, .. } => Some(external_id_field),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["External__c", "Legacy__c", "Id"]);
    }

    #[tokio::test]
    async fn test_deletes_split_by_id_presence() {
        let port = MockCrmPort::new().with_records(
            "Account",
            vec![
                Record::new().with("Id", "001").with("External__c", "E1"),
                Record::new().with("Id", "002").with("External__c", "E2"),
            ],
        );
        let key_fields = keys(&["External__c"]);
        let records = vec![
            Record::new().with("Id", "001").with("External__c", "E1").with("_deleted", true),
            Record::new().with("External__c", "E2").with("_deleted", true),
            Record::new().with("External__c", "E404").with("_deleted", true),
        ];

        let report = BulkBatcher::new(&key_fields)
            .submit(&port, "Account", records, Operation::Upsert)
            .await
            .unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.already_absent, 1);
        assert_eq!(report.failed_rows, 0);
        assert_eq!(port.count_calls(|c| matches!(c, CrmCall::Delete { .. })).await, 2);
        assert_eq!(
            port.count_calls(|c| matches!(c, CrmCall::BulkDelete { rows: 1, .. })).await,
            1
        );
        assert!(port.stored("Account").await.is_empty());
    }

    #[tokio::test]
    async fn test_chunks_respect_batch_size() {
        let port = MockCrmPort::new();
        let key_fields = keys(&["External__c"]);
        let records: Vec<Record> = (0..5)
            .map(|i| Record::new().with("External__c", format!("E{}", i)))
            .collect();

        BulkBatcher::new(&key_fields)
            .with_batch_size(2)
            .submit(&port, "Account", records, Operation::Upsert)
            .await
            .unwrap();

        let sizes: Vec<usize> = port
            .calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                CrmCall::BulkUpsert { rows, .. } => Some(rows),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_internal_fields_never_reach_the_crm() {
        let port = MockCrmPort::new();
        let key_fields = keys(&["External__c"]);
        let records = vec![Record::new()
            .with("External__c", "E1")
            .with("_id", "E1")
            .with("_updated", "2023-01-01T00:00:00Z")];

        BulkBatcher::new(&key_fields)
            .submit(&port, "Account", records, Operation::Upsert)
            .await
            .unwrap();

        let stored = port.stored("Account").await;
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].has_internal_fields());
    }

    #[tokio::test]
    async fn test_keyless_delete_is_counted_not_sent() {
        let port = MockCrmPort::new();
        let records = vec![Record::new().with("Name", "nobody")];

        let report = BulkBatcher::new(&[])
            .submit(&port, "Account", records, Operation::Delete)
            .await
            .unwrap();

        assert_eq!(report.failed_rows, 1);
        assert_eq!(report.partitions, 0);
        assert!(port.calls().await.is_empty());
    }
}
