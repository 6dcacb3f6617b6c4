//! HTTP client with retry and rate limiting
//!
//! Every store call goes through [`HttpClient::request`], which:
//! - waits on the rate limiter before each attempt
//! - re-logs once when a cached session or IAM token is rejected with 401
//! - classifies each failed attempt and retries it with backoff when the
//!   request's [`RetryPolicy`] allows it

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Client configuration
// ============================================================================

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative request paths
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries per request
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every request
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_type: BackoffType::Exponential,
            rate_limit: None,
            default_headers: HashMap::new(),
            user_agent: format!("cloudant-connector/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Backoff strategy with its initial and maximum delay
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a header sent with every request
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

// ============================================================================
// Per-request configuration
// ============================================================================

/// When a failed attempt may be sent again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Resending has no extra effect: reads, and writes whose documents
    /// all carry an `_id`
    #[default]
    Idempotent,
    /// Resend only if the store provably did not process the request:
    /// a refused connection or a 429 rejection. Timeouts and 5xx replies
    /// may follow a committed write and are returned as errors.
    UnprocessedOnly,
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Which failures may be retried
    pub retry: RetryPolicy,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append query parameters
    #[must_use]
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

// ============================================================================
// Attempt classification
// ============================================================================

/// A failed attempt, before it becomes an [`Error`]
enum Failure {
    Status { status: StatusCode, response: Response },
    Transport(reqwest::Error),
}

impl Failure {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Failure::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }

    fn may_retry(&self, policy: RetryPolicy) -> bool {
        let unprocessed = match self {
            Failure::Status { .. } => self.is_rate_limited(),
            Failure::Transport(e) => e.is_connect(),
        };
        let transient = match self {
            Failure::Status { status, .. } => is_retryable_status(*status),
            Failure::Transport(e) => e.is_timeout() || e.is_connect(),
        };
        match policy {
            RetryPolicy::Idempotent => transient,
            RetryPolicy::UnprocessedOnly => unprocessed,
        }
    }

    /// Delay requested by the server, if any
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Failure::Status { response, .. } if self.is_rate_limited() => {
                Some(Duration::from_secs(retry_after_secs(response)))
            }
            _ => None,
        }
    }

    async fn into_error(self, timeout: Duration) -> Error {
        match self {
            Failure::Status { status, response } if status == StatusCode::TOO_MANY_REQUESTS => {
                Error::RateLimited {
                    retry_after_seconds: retry_after_secs(&response),
                }
            }
            Failure::Status { status, response } => Error::HttpStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            },
            Failure::Transport(e) if e.is_timeout() => Error::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            Failure::Transport(e) if e.is_connect() => Error::connection(e.to_string()),
            Failure::Transport(e) => Error::Http(e),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Status { status, .. } => write!(f, "HTTP {}", status.as_u16()),
            Failure::Transport(e) if e.is_timeout() => write!(f, "timeout"),
            Failure::Transport(e) if e.is_connect() => write!(f, "connection error"),
            Failure::Transport(e) => write!(f, "{e}"),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client with retry and rate limiting
///
/// The underlying reqwest client pools connections and is safe for
/// concurrent use by partition workers.
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a client without authentication
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            authenticator: None,
            rate_limiter,
        })
    }

    /// Create a client that authenticates every request
    pub fn with_auth(config: HttpClientConfig, auth_config: AuthConfig) -> Result<Self> {
        let mut client = Self::with_config(config)?;
        client.authenticator = match auth_config {
            AuthConfig::None => None,
            other => Some(Authenticator::with_client(other, client.client.clone())),
        };
        Ok(client)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::GET, url, RequestConfig::new()).await
    }

    pub async fn put(&self, url: &str) -> Result<Response> {
        self.request(Method::PUT, url, RequestConfig::new()).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.request(Method::DELETE, url, RequestConfig::new()).await
    }

    pub async fn head(&self, url: &str) -> Result<Response> {
        self.request(Method::HEAD, url, RequestConfig::new()).await
    }

    /// Send a request, retrying failed attempts the policy allows
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let full_url = self.build_url(url);
        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        let mut relogged = false;

        loop {
            let failure = match self.send(&method, &full_url, &config).await? {
                Ok(response) => {
                    let status = response.status();

                    // An expired session or IAM token gets one fresh login
                    if status == StatusCode::UNAUTHORIZED && !relogged {
                        if let Some(auth) = self
                            .authenticator
                            .as_ref()
                            .filter(|a| a.config().uses_token())
                        {
                            debug!("401 from {full_url}, refreshing credentials");
                            auth.invalidate().await;
                            relogged = true;
                            continue;
                        }
                    }

                    if !(status.is_client_error() || status.is_server_error()) {
                        debug!("{method} {full_url}: {}", status.as_u16());
                        return Ok(response);
                    }
                    Failure::Status { status, response }
                }
                Err(e) => Failure::Transport(e),
            };

            if attempt >= max_retries || !failure.may_retry(config.retry) {
                if attempt < max_retries && !failure.is_rate_limited() {
                    debug!("{method} {full_url}: {failure}, not retried ({:?})", config.retry);
                }
                return Err(failure.into_error(self.config.timeout).await);
            }

            let delay = failure
                .retry_after()
                .unwrap_or_else(|| self.calculate_backoff(attempt));
            warn!(
                "{method} {full_url}: {failure}, attempt {}/{}, retrying in {delay:?}",
                attempt + 1,
                max_retries + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One attempt; the outer error is an authentication failure
    async fn send(
        &self,
        method: &Method,
        url: &str,
        config: &RequestConfig,
    ) -> Result<std::result::Result<Response, reqwest::Error>> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.request(method.clone(), url);
        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            req = req.query(&config.query);
        }
        if let Some(body) = &config.body {
            req = req.json(body);
        }
        if let Some(auth) = &self.authenticator {
            req = auth.apply(req).await?;
        }

        Ok(req.send().await)
    }

    /// Send a request and parse the JSON response
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<T> {
        let response = self.request(method, url, config).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::decode(format!("Invalid JSON from {url}: {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request_json(Method::GET, url, RequestConfig::new())
            .await
    }

    pub async fn get_json_with_config<T: DeserializeOwned>(
        &self,
        url: &str,
        config: RequestConfig,
    ) -> Result<T> {
        self.request_json(Method::GET, url, config).await
    }

    pub async fn post_json_with_config<T: DeserializeOwned>(
        &self,
        url: &str,
        config: RequestConfig,
    ) -> Result<T> {
        self.request_json(Method::POST, url, config).await
    }

    /// Absolute URLs pass through; relative paths are joined to the base URL
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }

    /// Backoff delay before retry number `attempt + 1`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff;
        let delay = match self.config.backoff_type {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial * (attempt + 1),
            BackoffType::Exponential => initial * 2u32.saturating_pow(attempt),
        };
        delay.min(self.config.max_backoff)
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524
    )
}

/// `Retry-After` in seconds, 1 when absent
fn retry_after_secs(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}
