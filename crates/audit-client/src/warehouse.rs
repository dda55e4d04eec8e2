//! [`DatasetSource`] and [`RecordSink`] backed by the BigQuery REST API.

use crate::client::BigQueryClient;
use crate::error::ClientError;
use access_audit_core::{
    AuditError, DatasetMetadata, DatasetReference, DatasetSource, RecordSink, Result,
    WriteOutcome, WriteRequest,
};
use async_trait::async_trait;

#[async_trait]
impl DatasetSource for BigQueryClient {
    async fn list_datasets(&self) -> Result<Vec<DatasetReference>> {
        let entries = BigQueryClient::list_datasets(self).await?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.dataset_reference.into())
            .collect())
    }

    async fn get_dataset(&self, dataset: &DatasetReference) -> Result<DatasetMetadata> {
        let dataset = self
            .get_dataset_in(&dataset.project_id, &dataset.dataset_id)
            .await?;
        Ok(dataset.into_metadata())
    }
}

#[async_trait]
impl RecordSink for BigQueryClient {
    async fn write_records(&self, request: WriteRequest<'_>) -> Result<WriteOutcome> {
        let job = self
            .load_records(
                request.destination,
                request.schema,
                request.disposition,
                request.records,
            )
            .await
            .map_err(|err| write_error(request.destination.to_string(), err))?;

        let rows_written = job
            .output_rows()
            .unwrap_or(request.records.len() as u64);

        tracing::info!(
            job_id = %job.job_reference.job_id,
            destination = %request.destination,
            rows = rows_written,
            "Load job completed"
        );

        Ok(WriteOutcome {
            job_id: Some(job.job_reference.job_id),
            rows_written,
        })
    }
}

fn write_error(table: String, err: ClientError) -> AuditError {
    if err.is_schema_mismatch() {
        let message = match err {
            ClientError::JobFailed { message, .. } | ClientError::BadRequest { message, .. } => {
                message
            }
            other => other.to_string(),
        };
        return AuditError::SchemaConflict { table, message };
    }
    err.into()
}
