//! Error types for the BigQuery client.

use access_audit_core::AuditError;
use std::time::Duration;

/// Errors that can occur when talking to BigQuery.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error raised inside the retry middleware
    #[error("HTTP request error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// Credentials could not be resolved or exchanged for a token
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication failed (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Permission denied (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request rejected as invalid (400)
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        /// First error reason reported by the API (e.g. "invalid")
        reason: Option<String>,
    },

    /// Rate limited (429, or 403 with a rate limit reason)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Optional retry-after duration from server
        retry_after: Option<Duration>,
        message: String,
    },

    /// Conflict (409), e.g. a job ID that already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Server error (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Error message from server
        message: String,
    },

    /// A load job finished with an error result
    #[error("Job {job_id} failed ({reason}): {message}")]
    JobFailed {
        job_id: String,
        reason: String,
        message: String,
    },

    /// A load job did not reach DONE before the configured deadline
    #[error("Job {job_id} did not finish within {waited:?}")]
    JobTimeout { job_id: String, waited: Duration },

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns true if a failed job was rejected because of the destination schema.
    pub fn is_schema_mismatch(&self) -> bool {
        let message = match self {
            ClientError::JobFailed { message, .. } => message,
            ClientError::BadRequest { message, .. } => message,
            _ => return false,
        };
        message.to_ascii_lowercase().contains("schema")
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for AuditError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(_) | ClientError::HttpMiddleware(_) => {
                AuditError::Network(err.to_string())
            }
            ClientError::RateLimited { .. } | ClientError::ServerError { .. } => {
                AuditError::Network(err.to_string())
            }
            ClientError::JobTimeout { .. } => AuditError::Network(err.to_string()),
            ClientError::Credentials(message) | ClientError::Unauthorized(message) => {
                AuditError::Authentication(message)
            }
            ClientError::Forbidden(message) => AuditError::PermissionDenied(message),
            ClientError::NotFound(message) => AuditError::NotFound(message),
            ClientError::Conflict(message) => AuditError::WriteRejected(message),
            ClientError::JobFailed { .. } => AuditError::WriteRejected(err.to_string()),
            ClientError::BadRequest { message, .. } => AuditError::Validation(message),
            ClientError::InvalidResponse(message) => AuditError::InvalidResponse(message),
            ClientError::Serialization(e) => AuditError::InvalidResponse(e.to_string()),
            ClientError::Config(message) => AuditError::Config(message),
        }
    }
}
