//! Access Audit
//!
//! Records which users hold which roles on which BigQuery datasets.
//!
//! - [`domain`] holds the domain model and the list, flatten and upload pipeline.
//! - [`bigquery`] talks to the BigQuery REST API and plugs into the pipeline.
//!
//! The `access-audit` binary in `crates/audit-cli` wires the two together.

pub use access_audit_client as bigquery;
pub use access_audit_core as domain;

pub use access_audit_client::{BigQueryClient, ClientConfig, ClientError};
pub use access_audit_core::{
    AccessEntryRecord, AuditConfig, AuditError, AuditPipeline, RunSummary, TableDestination,
    WriteDisposition,
};
