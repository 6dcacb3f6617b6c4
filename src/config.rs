//! Configuration types
//!
//! Connection settings are process-wide and read-only once an operation
//! starts. Read and write options arrive as case-insensitive string-keyed
//! maps and are parsed here into typed structures; unknown keys are either
//! rejected or ignored according to an explicit [`UnknownKeyPolicy`].

use crate::auth::{AuthConfig, DEFAULT_IAM_TOKEN_URL};
use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig};
use crate::types::{BackoffType, Protocol};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

// ============================================================================
// Defaults
// ============================================================================

/// Documents sampled for schema inference unless configured otherwise
pub const DEFAULT_SCHEMA_SAMPLE_SIZE: usize = 200;

/// Rows requested per page
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Documents per `_bulk_docs` call
pub const DEFAULT_BULK_SIZE: usize = 200;

/// Cloudant search returns at most 200 rows per request
pub const MAX_SEARCH_PAGE_SIZE: usize = 200;

// ============================================================================
// Endpoint
// ============================================================================

/// Scan endpoint used when no view, index or selector is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endpoint {
    /// `_all_docs`: key-ordered scan
    #[default]
    #[serde(rename = "_all_docs")]
    AllDocs,
    /// `_changes`: sequence-ordered feed
    #[serde(rename = "_changes")]
    Changes,
}

impl Endpoint {
    /// Path segment for this endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::AllDocs => "_all_docs",
            Endpoint::Changes => "_changes",
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "_all_docs" | "all_docs" => Ok(Endpoint::AllDocs),
            "_changes" | "changes" => Ok(Endpoint::Changes),
            other => Err(Error::invalid_value(
                "endpoint",
                format!("expected _all_docs or _changes, got '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Connection Config
// ============================================================================

/// HTTP tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for transient failures
    pub max_retries: u32,
    /// Backoff strategy between retries
    pub backoff: BackoffType,
    /// First backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_backoff_ms: u64,
    /// Optional client-side request quota
    pub requests_per_second: Option<u32>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            backoff: BackoffType::Exponential,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            requests_per_second: None,
        }
    }
}

/// Connection settings for one store account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// URL scheme
    #[serde(default)]
    pub protocol: Protocol,

    /// Host, optionally with port and path prefix (`acct.cloudant.com`, `localhost:5984`)
    pub host: String,

    /// Username for basic or session auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic or session auth
    #[serde(default)]
    pub password: Option<String>,

    /// IAM api key; takes precedence over username/password
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the IAM token endpoint
    #[serde(default)]
    pub iam_token_url: Option<String>,

    /// Use a `_session` cookie instead of sending basic auth on every call
    #[serde(default)]
    pub use_session: bool,

    /// Default database for reads and writes
    #[serde(default)]
    pub database: Option<String>,

    /// Default scan endpoint
    #[serde(default)]
    pub endpoint: Endpoint,

    /// HTTP tuning
    #[serde(default)]
    pub http: HttpSettings,
}

impl ConnectionConfig {
    /// Create a config for a host with default settings
    pub fn new(protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            username: None,
            password: None,
            api_key: None,
            iam_token_url: None,
            use_session: false,
            database: None,
            endpoint: Endpoint::default(),
            http: HttpSettings::default(),
        }
    }

    /// Build a config from a full server URL such as `http://localhost:5984`
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let protocol: Protocol = parsed
            .scheme()
            .parse()
            .map_err(|e: String| Error::invalid_value("protocol", e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::missing_field("host"))?;
        let mut host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let prefix = parsed.path().trim_end_matches('/');
        if !prefix.is_empty() {
            host.push_str(prefix);
        }
        Ok(Self::new(protocol, host))
    }

    /// Set basic auth credentials
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the default database
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the default endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set HTTP tuning
    #[must_use]
    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Check required fields and credential pairs
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::missing_field("host"));
        }
        match (&self.username, &self.password) {
            (Some(_), None) => return Err(Error::missing_field("password")),
            (None, Some(_)) => return Err(Error::missing_field("username")),
            _ => {}
        }
        if self.use_session && self.username.is_none() {
            return Err(Error::config("use_session requires username and password"));
        }
        Ok(())
    }

    /// Server root URL
    pub fn base_url(&self) -> Result<Url> {
        let host = self.host.trim().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}://{host}/", self.protocol.as_str()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Resolve the auth scheme from the configured credentials
    pub fn auth_config(&self) -> Result<AuthConfig> {
        if let Some(api_key) = &self.api_key {
            return Ok(AuthConfig::Iam {
                api_key: api_key.clone(),
                token_url: self
                    .iam_token_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IAM_TOKEN_URL.to_string()),
            });
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) if self.use_session => Ok(AuthConfig::Session {
                session_url: self.base_url()?.join("_session")?.to_string(),
                username: username.clone(),
                password: password.clone(),
            }),
            (Some(username), Some(password)) => Ok(AuthConfig::basic(username, password)),
            _ => Ok(AuthConfig::None),
        }
    }

    /// HTTP client configuration derived from these settings
    pub fn http_client_config(&self) -> Result<HttpClientConfig> {
        let mut builder = HttpClientConfig::builder()
            .base_url(self.base_url()?.to_string())
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .max_retries(self.http.max_retries)
            .backoff(
                self.http.backoff,
                Duration::from_millis(self.http.initial_backoff_ms),
                Duration::from_millis(self.http.max_backoff_ms),
            )
            .header("Accept", "application/json");

        builder = match self.http.requests_per_second {
            Some(rps) => builder.rate_limit(RateLimiterConfig::per_second(rps)),
            None => builder.no_rate_limit(),
        };

        Ok(builder.build())
    }
}

// ============================================================================
// Option bags
// ============================================================================

/// What to do with option keys that are not recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    /// Fail with [`Error::UnknownOption`]
    #[default]
    Reject,
    /// Log a warning and carry on
    Ignore,
}

impl UnknownKeyPolicy {
    fn handle(self, key: &str) -> Result<()> {
        match self {
            UnknownKeyPolicy::Reject => Err(Error::UnknownOption {
                key: key.to_string(),
            }),
            UnknownKeyPolicy::Ignore => {
                warn!("Ignoring unknown option '{key}'");
                Ok(())
            }
        }
    }
}

/// How the writer reacts to revision conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Report conflicted documents as failures
    #[default]
    Fail,
    /// Fetch the current revision and resubmit once
    Overwrite,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(ConflictPolicy::Fail),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            other => Err(Error::invalid_value(
                "conflictPolicy",
                format!("expected fail or overwrite, got '{other}'"),
            )),
        }
    }
}

/// Options for one read operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Database to read (falls back to the connection default)
    pub database: Option<String>,
    /// Search index path, e.g. `_design/ddoc/_search/idx`
    pub index: Option<String>,
    /// View path, e.g. `_design/ddoc/_view/v?reduce=true`
    pub view: Option<String>,
    /// Raw Mango selector JSON
    pub selector: Option<String>,
    /// Scan endpoint override
    pub endpoint: Option<Endpoint>,
    /// Documents sampled for schema inference; `None` samples everything
    pub schema_sample_size: Option<usize>,
    /// Requested parallelism
    pub partitions: usize,
    /// Rows per page
    pub page_size: usize,
    /// Flatten nested objects into dotted columns
    pub flatten: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            database: None,
            index: None,
            view: None,
            selector: None,
            endpoint: None,
            schema_sample_size: Some(DEFAULT_SCHEMA_SAMPLE_SIZE),
            partitions: 1,
            page_size: DEFAULT_PAGE_SIZE,
            flatten: false,
        }
    }
}

impl ReadOptions {
    /// Create default read options
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a string-keyed option map (keys are case-insensitive)
    pub fn from_map<I, K, V>(options: I, policy: UnknownKeyPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Self::default();

        for (key, value) in options {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key.to_ascii_lowercase().as_str() {
                "database" => parsed.database = non_empty(value),
                "index" => parsed.index = non_empty(value),
                "view" => parsed.view = non_empty(value),
                "selector" => parsed.selector = non_empty(value),
                "endpoint" => parsed.endpoint = Some(value.parse()?),
                "schemasamplesize" => parsed.schema_sample_size = parse_sample_size(value)?,
                "partitions" => parsed.partitions = parse_positive(key, value)?,
                "pagesize" => parsed.page_size = parse_positive(key, value)?,
                "flatten" => parsed.flatten = parse_bool(key, value)?,
                _ => policy.handle(key)?,
            }
        }

        Ok(parsed)
    }

    /// Set the database
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set a view path
    #[must_use]
    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Set a search index path
    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Set a raw selector
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Set the endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set requested parallelism
    #[must_use]
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the schema sample size (`None` = whole database)
    #[must_use]
    pub fn with_schema_sample_size(mut self, size: Option<usize>) -> Self {
        self.schema_sample_size = size;
        self
    }

    /// Enable flattening of nested objects
    #[must_use]
    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }
}

/// Options for one write operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Target database (falls back to the connection default)
    pub database: Option<String>,
    /// Create the database before the first write if it is missing
    pub create_db_on_save: bool,
    /// Documents per bulk call
    pub bulk_size: usize,
    /// Conflict handling
    pub conflict_policy: ConflictPolicy,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            database: None,
            create_db_on_save: false,
            bulk_size: DEFAULT_BULK_SIZE,
            conflict_policy: ConflictPolicy::Fail,
        }
    }
}

impl WriteOptions {
    /// Create default write options
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a string-keyed option map (keys are case-insensitive)
    pub fn from_map<I, K, V>(options: I, policy: UnknownKeyPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Self::default();

        for (key, value) in options {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key.to_ascii_lowercase().as_str() {
                "database" => parsed.database = non_empty(value),
                "createdbonsave" => parsed.create_db_on_save = parse_bool(key, value)?,
                "bulksize" => parsed.bulk_size = parse_positive(key, value)?,
                "conflictpolicy" => parsed.conflict_policy = value.parse()?,
                _ => policy.handle(key)?,
            }
        }

        Ok(parsed)
    }

    /// Set the database
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Create the database on first write
    #[must_use]
    pub fn with_create_db_on_save(mut self, create: bool) -> Self {
        self.create_db_on_save = create;
        self
    }

    /// Set documents per bulk call
    #[must_use]
    pub fn with_bulk_size(mut self, size: usize) -> Self {
        self.bulk_size = size.max(1);
        self
    }

    /// Set the conflict policy
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::invalid_value(
            key,
            format!("expected \"true\" or \"false\", got '{value}'"),
        )),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::invalid_value(
            key,
            format!("expected a positive integer, got '{value}'"),
        )),
    }
}

fn parse_sample_size(value: &str) -> Result<Option<usize>> {
    if value == "-1" {
        return Ok(None);
    }
    parse_positive("schemaSampleSize", value).map(Some)
}
