//! Access Audit BigQuery Client
//!
//! A Rust HTTP client for the parts of the BigQuery REST API an access audit
//! needs: dataset listing, dataset metadata, and multipart load jobs.
//!
//! # Features
//!
//! - **Dataset reads**: Paginated listing and per-dataset access entries
//! - **Bulk writes**: One NDJSON load job per run, polled until DONE
//! - **Automatic Retries**: Exponential backoff with jitter for transient read failures
//! - **Credentials**: Application default credentials (static token, credentials
//!   file, gcloud user credentials, or the metadata server)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use access_audit_client::{auth, BigQueryClient, ClientConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BigQueryClient::new(
//!         ClientConfig::builder("my-project")
//!             .timeout(Duration::from_secs(30))
//!             .build()?,
//!         auth::default_provider()?,
//!     )?;
//!
//!     for ds in client.list_datasets().await? {
//!         let dataset = client.get_dataset(&ds.dataset_reference.dataset_id).await?;
//!         println!("{}: {} grants", ds.dataset_reference.dataset_id, dataset.access.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return `Result<T, ClientError>`. Errors include:
//!
//! - `NotFound`: Dataset or job doesn't exist (404)
//! - `Unauthorized`: Invalid or expired token (401)
//! - `Forbidden`: Missing IAM permission (403)
//! - `RateLimited`: Too many requests (429, or 403 `rateLimitExceeded`)
//! - `JobFailed`: A load job finished with an error result
//!
//! Reads retry transient errors with exponential backoff. Load job uploads
//! are never retried.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod upload;
pub mod warehouse;

// Re-exports for convenience
pub use auth::{
    default_credentials, default_provider, AccessToken, CachingTokenProvider, CredentialsFile, DefaultCredentials,
    SharedTokenProvider, StaticTokenProvider, TokenProvider,
};
pub use client::BigQueryClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, Result};
pub use types::{
    Dataset, DatasetAccessEntry, DatasetList, DatasetListEntry, DatasetRef, Job, JobRef,
    JobStatus, LoadJobRequest,
};
