//! Bulk write of the accumulated records.

use crate::destination::{TableDestination, TableSchema, WriteDisposition};
use crate::entry::AccessEntryRecord;
use crate::Result;
use async_trait::async_trait;

/// Everything a sink needs for one bulk write.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub destination: &'a TableDestination,
    pub schema: &'a TableSchema,
    pub disposition: WriteDisposition,
    pub records: &'a [AccessEntryRecord],
}

/// Result of a completed bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Warehouse job that performed the write, if the sink uses jobs
    pub job_id: Option<String>,
    /// Rows the warehouse reports as written
    pub rows_written: u64,
}

/// Write side of the warehouse.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Perform exactly one bulk write of `request.records`.
    async fn write_records(&self, request: WriteRequest<'_>) -> Result<WriteOutcome>;
}

#[async_trait]
impl<T: RecordSink + ?Sized> RecordSink for std::sync::Arc<T> {
    async fn write_records(&self, request: WriteRequest<'_>) -> Result<WriteOutcome> {
        (**self).write_records(request).await
    }
}

/// Writes the full record collection to a fixed destination.
pub struct Uploader<'a, K: ?Sized> {
    sink: &'a K,
    destination: &'a TableDestination,
    schema: &'a TableSchema,
    disposition: WriteDisposition,
}

impl<'a, K: RecordSink + ?Sized> Uploader<'a, K> {
    pub fn new(
        sink: &'a K,
        destination: &'a TableDestination,
        schema: &'a TableSchema,
        disposition: WriteDisposition,
    ) -> Self {
        Self {
            sink,
            destination,
            schema,
            disposition,
        }
    }

    /// Consume the records in a single write. An empty collection is still
    /// written so that a truncating run leaves an empty table behind.
    pub async fn upload(&self, records: Vec<AccessEntryRecord>) -> Result<WriteOutcome> {
        self.destination.validate()?;
        self.schema.validate_for_records()?;

        tracing::info!(
            destination = %self.destination,
            disposition = %self.disposition,
            rows = records.len(),
            "Uploading access records"
        );

        let outcome = self
            .sink
            .write_records(WriteRequest {
                destination: self.destination,
                schema: self.schema,
                disposition: self.disposition,
                records: &records,
            })
            .await?;

        tracing::info!(
            destination = %self.destination,
            job_id = ?outcome.job_id,
            rows_written = outcome.rows_written,
            "Upload complete"
        );

        Ok(outcome)
    }
}
