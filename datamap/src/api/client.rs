//! HTTP client for the DataMap REST API.
//!
//! [`DatasetApi`] is the seam the download subsystem depends on;
//! [`DataMapClient`] is the reqwest-backed implementation used in production.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::models::{Dataset, DownloadUrl, Version, VersionEnvelope};
use crate::config::Settings;
use crate::BoxFuture;

/// Metadata operations the download subsystem needs from the platform.
///
/// This abstraction allows the downloader to be exercised against an
/// in-memory catalogue in tests.
pub trait DatasetApi: Send + Sync {
    /// Fetch a dataset with its versions.
    fn get_dataset(&self, dataset_id: Uuid) -> BoxFuture<'_, ApiResult<Dataset>>;

    /// Fetch a single version, including its file list.
    ///
    /// # Errors
    ///
    /// `NotFound` when the dataset or version does not exist, plus the
    /// usual authentication and transport errors.
    fn get_version<'a>(
        &'a self,
        dataset_id: Uuid,
        version_name: &'a str,
    ) -> BoxFuture<'a, ApiResult<Version>>;

    /// Obtain a short-lived download URL for one file.
    fn get_file_download_url<'a>(
        &'a self,
        dataset_id: Uuid,
        version_name: &'a str,
        file_id: Uuid,
    ) -> BoxFuture<'a, ApiResult<DownloadUrl>>;

    /// Check that the API is reachable and accepts the credentials.
    fn health_check(&self) -> BoxFuture<'_, ApiResult<()>>;
}

/// Connection settings for [`DataMapClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub user_id: Option<String>,
    pub tenancies: Option<String>,
    pub timeout: Duration,
    /// Retries after the first attempt for connect and timeout failures.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * 2^n`.
    pub retry_delay: Duration,
}

impl ClientConfig {
    /// Create a configuration with default transport settings.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            user_id: None,
            tenancies: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Build a client configuration from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Configuration` if the API key or secret is missing.
    pub fn from_settings(settings: &Settings) -> ApiResult<Self> {
        let (api_key, api_secret) = settings.credentials().ok_or_else(|| {
            ApiError::Configuration(
                "API key and secret are required. Set DATAMAP_API_KEY and DATAMAP_API_SECRET \
                 or add them to the config file"
                    .to_string(),
            )
        })?;

        Ok(Self::new(&settings.api_base_url, api_key, api_secret)
            .with_user_id(settings.user_id.clone())
            .with_tenancies(settings.tenancies.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_retries(
                settings.retry_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ))
    }

    /// Set the user id header value.
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the tenancies header value.
    pub fn with_tenancies(mut self, tenancies: Option<String>) -> Self {
        self.tenancies = tenancies;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count and base backoff delay.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// Delay before retry number `attempt` (zero-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

/// Build the default header set sent with every request.
fn default_headers(config: &ClientConfig) -> ApiResult<HeaderMap> {
    fn value(name: &str, raw: &str) -> ApiResult<HeaderValue> {
        HeaderValue::from_str(raw.trim())
            .map_err(|_| ApiError::Configuration(format!("{} contains invalid characters", name)))
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("datamap-cli/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert(
        HeaderName::from_static("x-api-key"),
        value("API key", &config.api_key)?,
    );
    headers.insert(
        HeaderName::from_static("x-api-secret"),
        value("API secret", &config.api_secret)?,
    );
    if let Some(ref user_id) = config.user_id {
        headers.insert(
            HeaderName::from_static("x-user-id"),
            value("User id", user_id)?,
        );
    }
    if let Some(ref tenancies) = config.tenancies {
        headers.insert(
            HeaderName::from_static("x-datamap-tenancies"),
            value("Tenancies", tenancies)?,
        );
    }
    Ok(headers)
}

/// Map a transport-level reqwest failure to the API taxonomy.
fn classify_transport(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

/// DataMap API client backed by reqwest.
#[derive(Debug, Clone)]
pub struct DataMapClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl DataMapClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Configuration` for empty credentials, a base URL
    /// without an http(s) scheme, or header values that cannot be encoded.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        if config.api_key.trim().is_empty() || config.api_secret.trim().is_empty() {
            return Err(ApiError::Configuration(
                "API key and secret are required".to_string(),
            ));
        }
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(ApiError::Configuration(format!(
                "API base URL must start with http:// or https://: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|e| ApiError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// GET an endpoint with retry, returning the body of a 2xx response.
    ///
    /// Only connect and timeout failures are retried; any HTTP response,
    /// including 5xx, is final.
    async fn get_body(&self, endpoint: &str, resource: &str, id: &str) -> ApiResult<String> {
        let url = self.url(endpoint);
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0u32;

        let response = loop {
            debug!(url = %url, attempt = attempt + 1, max_attempts, "Making API request");

            match self.http.get(&url).send().await {
                Ok(response) => break response,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_delay, attempt);
                    warn!(
                        url = %url,
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(url = %url, error = %e, attempts = attempt + 1, "Request failed");
                    return Err(classify_transport(&e));
                }
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "API returned error status");
            return Err(ApiError::from_status(status.as_u16(), &body, resource, id));
        }

        debug!(url = %url, status = status.as_u16(), "API request successful");
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        resource: &str,
        id: &str,
    ) -> ApiResult<T> {
        let body = self.get_body(endpoint, resource, id).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn fetch_dataset(&self, dataset_id: Uuid) -> ApiResult<Dataset> {
        let id = dataset_id.to_string();
        let dataset: Dataset = self
            .get_json(&format!("/datasets/{}", id), "Dataset", &id)
            .await?;
        info!(dataset_id = %dataset_id, versions = dataset.version_count(), "Dataset fetched");
        Ok(dataset)
    }

    async fn fetch_version(&self, dataset_id: Uuid, version_name: &str) -> ApiResult<Version> {
        let envelope: VersionEnvelope = self
            .get_json(
                &format!("/datasets/{}/versions/{}", dataset_id, version_name),
                "Version",
                &format!("{}/{}", dataset_id, version_name),
            )
            .await?;
        let version = envelope.version;
        info!(
            dataset_id = %dataset_id,
            version = %version_name,
            file_count = version.file_count(),
            "Version fetched"
        );
        Ok(version)
    }

    async fn fetch_download_url(
        &self,
        dataset_id: Uuid,
        version_name: &str,
        file_id: Uuid,
    ) -> ApiResult<DownloadUrl> {
        let url: DownloadUrl = self
            .get_json(
                &format!(
                    "/datasets/{}/versions/{}/files/{}",
                    dataset_id, version_name, file_id
                ),
                "File",
                &format!("{}/{}/{}", dataset_id, version_name, file_id),
            )
            .await?;
        if !url.is_http() {
            return Err(ApiError::InvalidResponse(format!(
                "download URL must use http or https: {}",
                url.url
            )));
        }
        debug!(file_id = %file_id, "Download URL obtained");
        Ok(url)
    }

    async fn check_health(&self) -> ApiResult<()> {
        match self.get_body("/health", "Endpoint", "/health").await {
            Ok(_) => {
                info!(base_url = %self.config.base_url, "API health check passed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "API health check failed");
                Err(e)
            }
        }
    }
}

impl DatasetApi for DataMapClient {
    fn get_dataset(&self, dataset_id: Uuid) -> BoxFuture<'_, ApiResult<Dataset>> {
        Box::pin(self.fetch_dataset(dataset_id))
    }

    fn get_version<'a>(
        &'a self,
        dataset_id: Uuid,
        version_name: &'a str,
    ) -> BoxFuture<'a, ApiResult<Version>> {
        Box::pin(self.fetch_version(dataset_id, version_name))
    }

    fn get_file_download_url<'a>(
        &'a self,
        dataset_id: Uuid,
        version_name: &'a str,
        file_id: Uuid,
    ) -> BoxFuture<'a, ApiResult<DownloadUrl>> {
        Box::pin(self.fetch_download_url(dataset_id, version_name, file_id))
    }

    fn health_check(&self) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(self.check_health())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("https://datamap.example.org/api/v1/", "key", "secret")
    }

    #[test]
    fn test_backoff_doubles_each_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = DataMapClient::new(config()).unwrap();
        assert_eq!(
            client.url("/datasets/abc"),
            "https://datamap.example.org/api/v1/datasets/abc"
        );
    }

    #[test]
    fn test_new_rejects_blank_credentials() {
        let cfg = ClientConfig::new("https://datamap.example.org", "  ", "secret");
        assert!(matches!(
            DataMapClient::new(cfg),
            Err(ApiError::Configuration(_))
        ));
    }

    #[test]
    fn test_new_rejects_non_http_base_url() {
        let cfg = ClientConfig::new("ftp://datamap.example.org", "key", "secret");
        assert!(matches!(
            DataMapClient::new(cfg),
            Err(ApiError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_headers_include_optional_identity() {
        let cfg = config()
            .with_user_id(Some("u-1".to_string()))
            .with_tenancies(Some("lab,field".to_string()));
        let headers = default_headers(&cfg).unwrap();

        assert_eq!(headers.get("x-api-key").unwrap(), "key");
        assert_eq!(headers.get("x-api-secret").unwrap(), "secret");
        assert_eq!(headers.get("x-user-id").unwrap(), "u-1");
        assert_eq!(headers.get("x-datamap-tenancies").unwrap(), "lab,field");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_default_headers_omit_absent_identity() {
        let headers = default_headers(&config()).unwrap();
        assert!(headers.get("x-user-id").is_none());
        assert!(headers.get("x-datamap-tenancies").is_none());
    }

    #[test]
    fn test_default_headers_reject_newlines() {
        let cfg = ClientConfig::new("https://datamap.example.org", "key\nInjected: 1", "secret");
        assert!(default_headers(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_network_error_after_retries() {
        // Port 9 (discard) on loopback refuses connections.
        let cfg = ClientConfig::new("http://127.0.0.1:9", "key", "secret")
            .with_retries(2, Duration::from_millis(1))
            .with_timeout(Duration::from_secs(2));
        let client = DataMapClient::new(cfg).unwrap();

        let err = client.health_check().await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
