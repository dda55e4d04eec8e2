//! Client configuration and builder pattern.

use crate::error::{ClientError, Result};
use std::time::Duration;

/// Default BigQuery REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Configuration for the BigQuery client.
///
/// Credentials are not part of the configuration; they are injected as a
/// [`TokenProvider`](crate::auth::TokenProvider) when the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Project whose datasets are listed
    pub project_id: String,
    /// Base URL of the BigQuery API (default: `https://bigquery.googleapis.com`)
    pub base_url: String,
    /// Location for load jobs (e.g. "EU"). None lets the warehouse infer it.
    pub location: Option<String>,
    /// Request timeout (default: 30 seconds)
    pub timeout: Duration,
    /// Maximum number of retries for transient read failures (default: 3)
    pub max_retries: u32,
    /// Initial retry delay for exponential backoff (default: 100ms)
    pub retry_initial_delay: Duration,
    /// Maximum retry delay (default: 10 seconds)
    pub retry_max_delay: Duration,
    /// Page size hint for dataset listing. None uses the server default.
    pub page_size: Option<u32>,
    /// Include hidden datasets (names starting with `_`) in listings (default: false)
    pub include_hidden: bool,
    /// Delay between load job status polls (default: 1 second)
    pub job_poll_interval: Duration,
    /// How long to wait for a load job before giving up (default: 10 minutes)
    pub job_timeout: Duration,
    /// Whether to verify TLS certificates (default: true)
    pub tls_verify: bool,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            location: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(10),
            page_size: None,
            include_hidden: false,
            job_poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
            tls_verify: true,
            user_agent: format!("access-audit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder for the given project.
    pub fn builder(project_id: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(project_id)
    }

    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Base URL without a trailing slash.
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(ClientError::Config("project_id cannot be empty".to_string()));
        }

        access_audit_core::validation::validate_project_id(&self.project_id)
            .map_err(|e| ClientError::Config(e.to_string()))?;

        if self.base_url.is_empty() {
            return Err(ClientError::Config("base_url cannot be empty".to_string()));
        }

        url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("Invalid base_url: {}", e)))?;

        if self.retry_initial_delay > self.retry_max_delay {
            return Err(ClientError::Config(format!(
                "retry_initial_delay ({:?}) must be <= retry_max_delay ({:?})",
                self.retry_initial_delay, self.retry_max_delay
            )));
        }

        if self.timeout < Self::MIN_TIMEOUT {
            return Err(ClientError::Config(format!(
                "timeout ({:?}) must be >= {:?}",
                self.timeout,
                Self::MIN_TIMEOUT
            )));
        }

        if self.page_size == Some(0) {
            return Err(ClientError::Config("page_size must be > 0".to_string()));
        }

        if self.job_poll_interval.is_zero() || self.job_poll_interval > self.job_timeout {
            return Err(ClientError::Config(format!(
                "job_poll_interval ({:?}) must be non-zero and <= job_timeout ({:?})",
                self.job_poll_interval, self.job_timeout
            )));
        }

        Ok(())
    }
}

/// Builder for client configuration.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder for the given project.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                project_id: project_id.into(),
                ..Default::default()
            },
        }
    }

    /// Point the client at a different API root (emulators, tests).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the location used for load jobs.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.config.location = Some(location.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the initial retry delay for exponential backoff.
    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.config.retry_initial_delay = delay;
        self
    }

    /// Set the maximum retry delay.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    /// Request at most `page_size` datasets per listing page.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    /// Include hidden datasets in listings.
    pub fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.config.include_hidden = include_hidden;
        self
    }

    /// Set the delay between load job status polls.
    pub fn job_poll_interval(mut self, interval: Duration) -> Self {
        self.config.job_poll_interval = interval;
        self
    }

    /// Set how long to wait for a load job to finish.
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// Set whether to verify TLS certificates.
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls_verify = verify;
        self
    }

    /// Set a custom User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert!(!config.include_hidden);
        assert!(config.location.is_none());
        assert!(config.page_size.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder("my-project")
            .base_url("http://localhost:9050")
            .location("EU")
            .timeout(Duration::from_secs(60))
            .max_retries(5)
            .page_size(50)
            .include_hidden(true)
            .build()
            .unwrap();

        assert_eq!(config.project_id, "my-project");
        assert_eq!(config.base_url, "http://localhost:9050");
        assert_eq!(config.location.as_deref(), Some("EU"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.page_size, Some(50));
        assert!(config.include_hidden);
    }

    #[test]
    fn test_api_root_trims_slash() {
        let config = ClientConfig::builder("my-project")
            .base_url("http://localhost:9050/")
            .build()
            .unwrap();
        assert_eq!(config.api_root(), "http://localhost:9050");
    }

    #[test]
    fn test_missing_project() {
        let result = ClientConfig::builder("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_project() {
        let result = ClientConfig::builder("Not A Project").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_url() {
        let result = ClientConfig::builder("my-project")
            .base_url("not a valid url")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_delay_validation_invalid() {
        let result = ClientConfig::builder("my-project")
            .retry_initial_delay(Duration::from_secs(10))
            .retry_max_delay(Duration::from_secs(1))
            .build();

        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("retry_initial_delay"),
            "Error should mention retry_initial_delay"
        );
    }

    #[test]
    fn test_timeout_too_small() {
        let result = ClientConfig::builder("my-project")
            .timeout(Duration::from_millis(50))
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timeout"), "Error should mention timeout");
    }

    #[test]
    fn test_timeout_at_minimum() {
        let result = ClientConfig::builder("my-project")
            .timeout(ClientConfig::MIN_TIMEOUT)
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = ClientConfig::builder("my-project").page_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let result = ClientConfig::builder("my-project")
            .job_poll_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());

        let result = ClientConfig::builder("my-project")
            .job_poll_interval(Duration::from_secs(5))
            .job_timeout(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }
}
