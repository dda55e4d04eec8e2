//! HTTP client for the BigQuery REST API with retry logic.

use crate::auth::SharedTokenProvider;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{
    ApiError, ApiErrorResponse, Dataset, DatasetList, DatasetListEntry, Job, JobConfiguration,
    JobRef, LoadConfiguration, LoadJobRequest,
};
use crate::upload::{encode_ndjson, MultipartRelated};
use access_audit_core::{AccessEntryRecord, TableDestination, TableSchema, WriteDisposition};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    policies::ExponentialBackoff, RetryTransientMiddleware, Retryable, RetryableStrategy,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Body of a request: content type and raw bytes.
type RequestBody = Option<(String, Vec<u8>)>;

/// BigQuery HTTP client.
///
/// Reads go through an exponential-backoff retry layer. Load job uploads do
/// not: a bulk write is attempted exactly once.
pub struct BigQueryClient {
    http: ClientWithMiddleware,
    upload_http: ClientWithMiddleware,
    config: ClientConfig,
    auth: SharedTokenProvider,
}

impl BigQueryClient {
    /// Create a new configuration builder for the given project.
    pub fn builder(project_id: impl Into<String>) -> crate::config::ClientConfigBuilder {
        crate::config::ClientConfigBuilder::new(project_id)
    }

    /// Create a new client with the given configuration and credentials.
    pub fn new(config: ClientConfig, auth: SharedTokenProvider) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("access-audit")),
        );

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.retry_initial_delay, config.retry_max_delay)
            .build_with_max_retries(config.max_retries);

        let http = ClientBuilder::new(reqwest_client.clone())
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                BigQueryRetryStrategy,
            ))
            .build();

        let upload_http = ClientBuilder::new(reqwest_client).build();

        tracing::debug!(
            project = %config.project_id,
            base_url = %config.base_url,
            credentials = auth.name(),
            "Created BigQuery client"
        );

        Ok(Self {
            http,
            upload_http,
            config,
            auth,
        })
    }

    /// Project whose datasets are listed.
    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Dataset Operations
    // =========================================================================

    /// Fetch one page of the dataset listing.
    pub async fn list_datasets_page(&self, page_token: Option<&str>) -> Result<DatasetList> {
        let path = format!(
            "/bigquery/v2/projects/{}/datasets",
            urlencoding::encode(&self.config.project_id)
        );

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(size) = self.config.page_size {
            query.push(("maxResults", size.to_string()));
        }
        if self.config.include_hidden {
            query.push(("all", "true".to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        self.get(&path, &query).await
    }

    /// List all datasets in the project, following every page.
    pub async fn list_datasets(&self) -> Result<Vec<DatasetListEntry>> {
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self.list_datasets_page(page_token.as_deref()).await?;
            pages += 1;
            datasets.extend(page.datasets);

            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(ClientError::InvalidResponse(format!(
                            "Dataset listing repeated page token '{}'",
                            next
                        )));
                    }
                    page_token = Some(next);
                }
                _ => break,
            }
        }

        tracing::debug!(
            project = %self.config.project_id,
            datasets = datasets.len(),
            pages,
            "Listed datasets"
        );

        Ok(datasets)
    }

    /// Get a dataset in the configured project.
    pub async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        self.get_dataset_in(&self.config.project_id, dataset_id).await
    }

    /// Get a dataset, including its access entries.
    pub async fn get_dataset_in(&self, project_id: &str, dataset_id: &str) -> Result<Dataset> {
        let path = format!(
            "/bigquery/v2/projects/{}/datasets/{}",
            urlencoding::encode(project_id),
            urlencoding::encode(dataset_id)
        );
        self.get(&path, &[]).await
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Start a load job with the data in `media`. Not retried.
    pub async fn insert_load_job(&self, request: &LoadJobRequest, media: &[u8]) -> Result<Job> {
        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs",
            self.config.api_root(),
            urlencoding::encode(&request.job_reference.project_id)
        );
        let multipart = MultipartRelated::new(request, media)?;
        let content_type = multipart.content_type();

        self.send(
            &self.upload_http,
            Method::POST,
            &url,
            &[("uploadType", "multipart".to_string())],
            Some((content_type, multipart.into_body())),
        )
        .await
    }

    /// Fetch the current state of a job.
    pub async fn get_job(&self, job: &JobRef) -> Result<Job> {
        let path = format!(
            "/bigquery/v2/projects/{}/jobs/{}",
            urlencoding::encode(&job.project_id),
            urlencoding::encode(&job.job_id)
        );
        let mut query = Vec::new();
        if let Some(ref location) = job.location {
            query.push(("location", location.clone()));
        }
        self.get(&path, &query).await
    }

    /// Request cancellation of a job. BigQuery cancels asynchronously.
    pub async fn cancel_job(&self, job: &JobRef) -> Result<()> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}/cancel",
            self.config.api_root(),
            urlencoding::encode(&job.project_id),
            urlencoding::encode(&job.job_id)
        );
        let mut query = Vec::new();
        if let Some(ref location) = job.location {
            query.push(("location", location.clone()));
        }

        let _: serde_json::Value = self
            .send(&self.http, Method::POST, &url, &query, None)
            .await?;
        tracing::info!(job_id = %job.job_id, "Cancelled load job");
        Ok(())
    }

    /// Poll until the job is DONE, then surface its error result if any.
    /// A job still running at the deadline is cancelled.
    pub async fn wait_for_job(&self, job: Job) -> Result<Job> {
        let started = Instant::now();
        let mut job = job;

        loop {
            if job.is_done() {
                return Self::check_job(job);
            }

            let waited = started.elapsed();
            if waited >= self.config.job_timeout {
                // A job left running could still replace the destination table
                if let Err(e) = self.cancel_job(&job.job_reference).await {
                    tracing::warn!(
                        job_id = %job.job_reference.job_id,
                        error = %e,
                        "Failed to cancel timed out job"
                    );
                }
                return Err(ClientError::JobTimeout {
                    job_id: job.job_reference.job_id,
                    waited,
                });
            }

            tracing::debug!(
                job_id = %job.job_reference.job_id,
                state = job.status.as_ref().map(|s| s.state.as_str()).unwrap_or("UNKNOWN"),
                "Waiting for job"
            );
            tokio::time::sleep(self.config.job_poll_interval).await;
            job = self.get_job(&job.job_reference).await?;
        }
    }

    /// Load `records` into `destination` as one NDJSON load job and wait for
    /// it to finish.
    pub async fn load_records(
        &self,
        destination: &TableDestination,
        schema: &TableSchema,
        disposition: WriteDisposition,
        records: &[AccessEntryRecord],
    ) -> Result<Job> {
        let media = encode_ndjson(records)?;

        let mut labels = HashMap::new();
        labels.insert("created_by".to_string(), "access-audit".to_string());

        let request = LoadJobRequest {
            job_reference: JobRef {
                project_id: destination.project_id.clone(),
                job_id: format!("access_audit_{}", uuid::Uuid::new_v4().simple()),
                location: self.config.location.clone(),
            },
            configuration: JobConfiguration {
                load: LoadConfiguration::ndjson(destination, schema, disposition),
                labels,
            },
        };

        tracing::debug!(
            job_id = %request.job_reference.job_id,
            destination = %destination,
            bytes = media.len(),
            "Starting load job"
        );

        let job = self.insert_load_job(&request, &media).await?;
        self.wait_for_job(job).await
    }

    fn check_job(job: Job) -> Result<Job> {
        let Some(error) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) else {
            return Ok(job);
        };

        if let Some(status) = job.status.as_ref() {
            for detail in &status.errors {
                tracing::warn!(
                    job_id = %job.job_reference.job_id,
                    reason = ?detail.reason,
                    location = ?detail.location,
                    message = ?detail.message,
                    "Load job error"
                );
            }
        }

        Err(ClientError::JobFailed {
            job_id: job.job_reference.job_id.clone(),
            reason: error.reason.clone().unwrap_or_else(|| "unknown".to_string()),
            message: error.message.clone().unwrap_or_default(),
        })
    }

    // =========================================================================
    // Internal HTTP Methods
    // =========================================================================

    /// Perform a retried GET against a path under the API root.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.config.api_root(), path);
        self.send(&self.http, Method::GET, &url, query, None).await
    }

    /// Perform an authenticated HTTP request and deserialize the response.
    async fn send<T>(
        &self,
        http: &ClientWithMiddleware,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: RequestBody,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.auth.token().await?;
        let start = Instant::now();

        tracing::debug!(method = %method, url = %url, "Sending request");

        let mut request = http
            .request(method.clone(), url)
            .bearer_auth(token.secret())
            .query(query);
        if let Some((content_type, bytes)) = body {
            request = request.header(CONTENT_TYPE, content_type).body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        let duration = start.elapsed();

        tracing::debug!(
            method = %method,
            url = %url,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Received response"
        );

        if status.is_success() {
            let body = response.bytes().await?;
            serde_json::from_slice(&body).map_err(|e| {
                ClientError::InvalidResponse(format!(
                    "Failed to parse response: {} (body: {})",
                    e,
                    String::from_utf8_lossy(&body)
                ))
            })
        } else {
            let retry_after = Self::parse_retry_after(response.headers());

            let error_body = response.bytes().await.ok();
            let api_error: Option<ApiError> = error_body
                .as_ref()
                .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
                .map(|r| r.error);

            let message = api_error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| {
                    error_body
                        .map(|b| String::from_utf8_lossy(&b).to_string())
                        .unwrap_or_else(|| status.to_string())
                });

            tracing::warn!(
                method = %method,
                url = %url,
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                reason = ?api_error.as_ref().and_then(|e| e.reason()),
                error = %message,
                "Request failed"
            );

            Err(Self::status_to_error(
                status,
                api_error.as_ref().and_then(|e| e.reason()),
                message,
                retry_after,
            ))
        }
    }

    /// Convert HTTP status to appropriate error type.
    ///
    /// BigQuery reports some rate limits as 403 with a `rateLimitExceeded` or
    /// `quotaExceeded` reason.
    fn status_to_error(
        status: StatusCode,
        reason: Option<&str>,
        message: String,
        retry_after: Option<Duration>,
    ) -> ClientError {
        match status {
            StatusCode::BAD_REQUEST => ClientError::BadRequest {
                message,
                reason: reason.map(String::from),
            },
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
            StatusCode::FORBIDDEN
                if matches!(reason, Some("rateLimitExceeded") | Some("quotaExceeded")) =>
            {
                ClientError::RateLimited {
                    retry_after,
                    message,
                }
            }
            StatusCode::FORBIDDEN => ClientError::Forbidden(message),
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited {
                retry_after,
                message,
            },
            _ => ClientError::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Parse the Retry-After header value into a Duration.
    ///
    /// Supports both formats per RFC 7231:
    /// - Seconds: "120" -> Duration::from_secs(120)
    /// - HTTP-date: "Fri, 31 Dec 2024 23:59:59 GMT" -> Duration until that time
    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        let header_value = headers.get("retry-after")?.to_str().ok()?;

        if let Ok(seconds) = header_value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }

        if let Ok(date) = httpdate::parse_http_date(header_value) {
            let now = std::time::SystemTime::now();
            return Some(date.duration_since(now).unwrap_or(Duration::ZERO));
        }

        None
    }
}

/// Retry strategy for reads.
///
/// Retries on:
/// - Transient network errors (timeouts, connection failures)
/// - 5xx server errors
/// - 429 rate limiting
///
/// Does NOT retry other 4xx client errors.
struct BigQueryRetryStrategy;

impl RetryableStrategy for BigQueryRetryStrategy {
    fn handle(&self, res: &reqwest_middleware::Result<reqwest::Response>) -> Option<Retryable> {
        match res {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    Some(Retryable::Transient)
                } else if status.is_success() {
                    None
                } else {
                    Some(Retryable::Fatal)
                }
            }
            Err(error) => {
                if error.is_timeout() || error.is_connect() {
                    Some(Retryable::Transient)
                } else {
                    Some(Retryable::Fatal)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorProto, JobStatus};

    fn job(status: Option<JobStatus>) -> Job {
        Job {
            id: None,
            job_reference: JobRef {
                project_id: "p".to_string(),
                job_id: "job_1".to_string(),
                location: None,
            },
            status,
            statistics: None,
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));

        let result = BigQueryClient::parse_retry_after(&headers);
        assert_eq!(result, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_past_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Fri, 31 Dec 1999 23:59:59 GMT"),
        );

        let result = BigQueryClient::parse_retry_after(&headers);
        assert_eq!(result, Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_missing_or_invalid() {
        let headers = HeaderMap::new();
        assert_eq!(BigQueryClient::parse_retry_after(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("not-a-number"));
        assert_eq!(BigQueryClient::parse_retry_after(&headers), None);
    }

    #[test]
    fn test_forbidden_rate_limit_maps_to_rate_limited() {
        let err = BigQueryClient::status_to_error(
            StatusCode::FORBIDDEN,
            Some("rateLimitExceeded"),
            "Exceeded rate limits".to_string(),
            None,
        );
        assert!(matches!(err, ClientError::RateLimited { .. }));

        let err = BigQueryClient::status_to_error(
            StatusCode::FORBIDDEN,
            Some("accessDenied"),
            "Access Denied".to_string(),
            None,
        );
        assert!(matches!(err, ClientError::Forbidden(_)));
    }

    #[test]
    fn test_status_mapping() {
        let err = BigQueryClient::status_to_error(
            StatusCode::BAD_REQUEST,
            Some("invalid"),
            "Invalid table ID".to_string(),
            None,
        );
        assert!(matches!(err, ClientError::BadRequest { reason: Some(ref r), .. } if r == "invalid"));

        let err =
            BigQueryClient::status_to_error(StatusCode::BAD_GATEWAY, None, "oops".into(), None);
        assert!(matches!(err, ClientError::ServerError { status: 502, .. }));
    }

    #[test]
    fn test_check_job_success() {
        let done = job(Some(JobStatus {
            state: "DONE".to_string(),
            error_result: None,
            errors: vec![],
        }));
        assert!(BigQueryClient::check_job(done).is_ok());
    }

    #[test]
    fn test_check_job_error_result() {
        let failed = job(Some(JobStatus {
            state: "DONE".to_string(),
            error_result: Some(ErrorProto {
                reason: Some("invalid".to_string()),
                message: Some("Provided Schema does not match Table p:d.t".to_string()),
                location: None,
            }),
            errors: vec![],
        }));

        let err = BigQueryClient::check_job(failed).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(matches!(err, ClientError::JobFailed { ref reason, .. } if reason == "invalid"));
    }
}
