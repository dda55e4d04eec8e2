//! Credential providers.
//!
//! A [`TokenProvider`] is resolved once at program start and handed to the
//! client, which asks it for a bearer token before every request.
//! [`default_credentials`] follows Application Default Credentials and also
//! reports the project a service-account key names:
//!
//! 1. `GOOGLE_OAUTH_ACCESS_TOKEN` (a ready-made token)
//! 2. `GOOGLE_APPLICATION_CREDENTIALS` (service account or authorized user file)
//! 3. The gcloud well-known file (`gcloud auth application-default login`)
//! 4. The GCE/GKE metadata server
//!
//! Tokens are never logged. `Debug` output masks them.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// OAuth scope for BigQuery.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Token endpoint used when a credentials file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Metadata server used when `GCE_METADATA_HOST` is unset.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Tokens this close to expiry are refreshed before use.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<Instant>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Token valid for `expires_in` from now.
    pub fn expiring_in(secret: impl Into<String>, expires_in: Duration) -> Self {
        Self::new(secret, Some(Instant::now() + expires_in))
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// True if the token will still be valid `margin` from now.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() + margin < expires_at,
            None => true,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"***REDACTED***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for warehouse calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token valid for at least the next request.
    async fn token(&self) -> Result<AccessToken>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Shared provider handle.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Successful response from an OAuth token endpoint or the metadata server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn into_token(self) -> AccessToken {
        match self.expires_in {
            Some(secs) => AccessToken::expiring_in(self.access_token, Duration::from_secs(secs)),
            None => AccessToken::new(self.access_token, None),
        }
    }
}

/// Error body from an OAuth token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

async fn read_token_response(response: reqwest::Response, source: &str) -> Result<AccessToken> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        let parsed: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            ClientError::Credentials(format!("{}: unreadable token response: {}", source, e))
        })?;
        return Ok(parsed.into_token());
    }

    let detail = serde_json::from_slice::<TokenErrorResponse>(&body)
        .map(|e| match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        })
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());

    tracing::warn!(source = %source, status = %status.as_u16(), "Token request failed");

    Err(ClientError::Credentials(format!(
        "{} returned {}: {}",
        source, status, detail
    )))
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?)
}

// =========================================================================
// Static token
// =========================================================================

/// A fixed token, e.g. from `gcloud auth print-access-token`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"***REDACTED***")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AccessToken> {
        Ok(AccessToken::new(self.token.clone(), None))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// =========================================================================
// Credential files
// =========================================================================

/// Contents of a credentials JSON file, keyed on its `type` field.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
        #[serde(default)]
        project_id: Option<String>,
    },
}

impl fmt::Debug for CredentialsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsFile::AuthorizedUser { client_id, .. } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .field("refresh_token", &"***REDACTED***")
                .finish(),
            CredentialsFile::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("private_key", &"***REDACTED***")
                .finish(),
        }
    }
}

impl CredentialsFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClientError::Credentials(format!("Invalid credentials file: {}", e)))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Credentials(format!(
                "Cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Project named in the file, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            CredentialsFile::ServiceAccount { project_id, .. } => project_id.as_deref(),
            CredentialsFile::AuthorizedUser { .. } => None,
        }
    }

    /// Build the provider this file describes.
    pub fn into_provider(self) -> Result<SharedTokenProvider> {
        let provider: SharedTokenProvider = match self {
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Arc::new(AuthorizedUserProvider::new(
                client_id,
                client_secret,
                refresh_token,
                token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            )?),
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
                ..
            } => Arc::new(ServiceAccountProvider::new(
                client_email,
                &private_key,
                private_key_id,
                token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            )?),
        };
        Ok(provider)
    }
}

// =========================================================================
// Authorized user (refresh token)
// =========================================================================

/// Exchanges a user refresh token for access tokens.
pub struct AuthorizedUserProvider {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    http: reqwest::Client,
}

impl AuthorizedUserProvider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            token_uri: token_uri.into(),
            http: http_client()?,
        })
    }
}

#[async_trait]
impl TokenProvider for AuthorizedUserProvider {
    async fn token(&self) -> Result<AccessToken> {
        tracing::debug!(token_uri = %self.token_uri, "Refreshing user access token");
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;
        read_token_response(response, "authorized_user").await
    }

    fn name(&self) -> &'static str {
        "authorized_user"
    }
}

// =========================================================================
// Service account (JWT bearer grant)
// =========================================================================

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Signs a short-lived RS256 assertion with a service account key and
/// exchanges it for an access token.
pub struct ServiceAccountProvider {
    client_email: String,
    key: jsonwebtoken::EncodingKey,
    key_id: Option<String>,
    token_uri: String,
    http: reqwest::Client,
}

impl ServiceAccountProvider {
    /// Lifetime requested for each assertion.
    pub const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

    pub fn new(
        client_email: impl Into<String>,
        private_key_pem: &str,
        key_id: Option<String>,
        token_uri: impl Into<String>,
    ) -> Result<Self> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| ClientError::Credentials(format!("Invalid service account key: {}", e)))?;
        Ok(Self {
            client_email: client_email.into(),
            key,
            key_id,
            token_uri: token_uri.into(),
            http: http_client()?,
        })
    }

    /// Build the signed assertion sent to the token endpoint.
    pub fn assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::Credentials(format!("System clock error: {}", e)))?
            .as_secs();
        let claims = JwtClaims {
            iss: &self.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + Self::ASSERTION_LIFETIME.as_secs(),
        };

        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| ClientError::Credentials(format!("Failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountProvider {
    async fn token(&self) -> Result<AccessToken> {
        tracing::debug!(
            client_email = %self.client_email,
            token_uri = %self.token_uri,
            "Requesting service account token"
        );
        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        read_token_response(response, "service_account").await
    }

    fn name(&self) -> &'static str {
        "service_account"
    }
}

// =========================================================================
// Metadata server
// =========================================================================

/// Fetches tokens for the attached service account from the metadata server.
pub struct MetadataServerProvider {
    base_url: String,
    http: reqwest::Client,
}

impl MetadataServerProvider {
    /// `host` is a bare host (`metadata.google.internal`) or a full base URL.
    pub fn new(host: &str) -> Result<Self> {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Ok(Self {
            base_url,
            http: http_client()?,
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataServerProvider {
    async fn token(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .query(&[("scopes", BIGQUERY_SCOPE)])
            .send()
            .await
            .map_err(|e| {
                ClientError::Credentials(format!(
                    "Metadata server unreachable ({}); no credentials found: {}",
                    self.base_url, e
                ))
            })?;
        read_token_response(response, "metadata_server").await
    }

    fn name(&self) -> &'static str {
        "metadata_server"
    }
}

// =========================================================================
// Caching wrapper
// =========================================================================

/// Reuses a token until it is within [`REFRESH_MARGIN`] of expiry.
pub struct CachingTokenProvider {
    inner: SharedTokenProvider,
    cached: Mutex<Option<AccessToken>>,
    margin: Duration,
}

impl CachingTokenProvider {
    pub fn new(inner: SharedTokenProvider) -> Self {
        Self::with_margin(inner, REFRESH_MARGIN)
    }

    pub fn with_margin(inner: SharedTokenProvider, margin: Duration) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
            margin,
        }
    }
}

#[async_trait]
impl TokenProvider for CachingTokenProvider {
    async fn token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(self.margin) {
                return Ok(token.clone());
            }
        }

        let token = self.inner.token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// =========================================================================
// Application Default Credentials
// =========================================================================

/// Path of the file written by `gcloud auth application-default login`.
pub fn well_known_credentials_path(lookup: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(dir) = lookup("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(dir).join("application_default_credentials.json"));
    }
    if cfg!(windows) {
        let appdata = lookup("APPDATA")?;
        return Some(
            PathBuf::from(appdata)
                .join("gcloud")
                .join("application_default_credentials.json"),
        );
    }
    let home = lookup("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("gcloud")
            .join("application_default_credentials.json"),
    )
}

/// Credentials resolved from the environment, plus the project they name.
pub struct DefaultCredentials {
    pub provider: SharedTokenProvider,
    /// `project_id` from a service-account key file, when there is one
    pub project_id: Option<String>,
}

impl fmt::Debug for DefaultCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCredentials")
            .field("provider", &self.provider.name())
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Resolve Application Default Credentials using `lookup` for environment
/// variables. The provider is wrapped in a [`CachingTokenProvider`].
pub fn default_credentials_with(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<DefaultCredentials> {
    let (resolved, project_id): (SharedTokenProvider, Option<String>) =
        if let Some(token) = lookup("GOOGLE_OAUTH_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
            tracing::info!("Using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
            (Arc::new(StaticTokenProvider::new(token)), None)
        } else if let Some(path) = lookup("GOOGLE_APPLICATION_CREDENTIALS").filter(|p| !p.is_empty())
        {
            tracing::info!(path = %path, "Using credentials from GOOGLE_APPLICATION_CREDENTIALS");
            from_file(Path::new(&path))?
        } else if let Some(path) = well_known_credentials_path(lookup).filter(|p| p.is_file()) {
            tracing::info!(path = %path.display(), "Using gcloud application default credentials");
            from_file(&path)?
        } else {
            let host = lookup("GCE_METADATA_HOST").unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
            tracing::info!(host = %host, "Using metadata server credentials");
            (Arc::new(MetadataServerProvider::new(&host)?), None)
        };

    Ok(DefaultCredentials {
        provider: Arc::new(CachingTokenProvider::new(resolved)),
        project_id,
    })
}

fn from_file(path: &Path) -> Result<(SharedTokenProvider, Option<String>)> {
    let file = CredentialsFile::from_path(path)?;
    let project_id = file.project_id().map(String::from);
    Ok((file.into_provider()?, project_id))
}

/// Resolve Application Default Credentials from the process environment.
pub fn default_credentials() -> Result<DefaultCredentials> {
    default_credentials_with(&|key| std::env::var(key).ok())
}

/// Like [`default_credentials_with`], keeping only the provider.
pub fn default_provider_with(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<SharedTokenProvider> {
    Ok(default_credentials_with(lookup)?.provider)
}

/// Resolve a token provider from the process environment.
pub fn default_provider() -> Result<SharedTokenProvider> {
    default_provider_with(&|key| std::env::var(key).ok())
}
