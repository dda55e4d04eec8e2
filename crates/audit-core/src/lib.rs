//! Access Audit Core
//!
//! Domain types and the scan pipeline for auditing dataset access grants.
//!
//! The pipeline has three steps, run once and in order:
//!
//! 1. [`Lister`] enumerates every dataset visible through a [`DatasetSource`]
//!    and re-fetches each one for its access entries.
//! 2. [`flatten`] keeps only `userByEmail` grants and projects them into
//!    [`AccessEntryRecord`] rows.
//! 3. [`Uploader`] hands the complete row set to a [`RecordSink`] in a single
//!    bulk write.
//!
//! [`AuditPipeline`] wires the three together. The warehouse itself sits behind
//! the two traits so the pipeline can run against in-memory fakes in tests.

pub mod destination;
pub mod entry;
pub mod flatten;
pub mod lister;
pub mod pipeline;
pub mod principal;
pub mod uploader;
pub mod validation;

pub use destination::{SchemaField, TableDestination, TableSchema, WriteDisposition};
pub use entry::{AccessEntry, AccessEntryRecord, DatasetMetadata, DatasetReference};
pub use flatten::{flatten, flatten_all};
pub use lister::{DatasetSource, Lister};
pub use pipeline::{AuditConfig, AuditPipeline, CollectedRecords, RunSummary};
pub use principal::PrincipalType;
pub use uploader::{RecordSink, Uploader, WriteOutcome, WriteRequest};

/// Errors surfaced by an audit run.
///
/// Every variant is fatal to the run; nothing is retried or salvaged at this
/// layer.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Credentials are missing, invalid, or could not be exchanged for a token.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is authenticated but lacks permission for the call.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transport failure or a server-side error that outlasted client retries.
    #[error("Network error: {0}")]
    Network(String),

    /// A dataset, table, or job referenced by the run no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The destination table exists with a schema the records cannot load into.
    #[error("Schema conflict on {table}: {message}")]
    SchemaConflict { table: String, message: String },

    /// The warehouse rejected the bulk write for a reason other than schema.
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// The warehouse answered with a payload that could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
