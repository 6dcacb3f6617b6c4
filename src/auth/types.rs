//! Auth configuration types
//!
//! These types represent the runtime auth configuration resolved from the
//! connection settings.

use chrono::{DateTime, Utc};

/// Default IBM Cloud IAM token endpoint
pub const DEFAULT_IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// CouchDB cookie sessions last ten minutes unless the server is reconfigured
pub const SESSION_LIFETIME_SECONDS: i64 = 600;

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// CouchDB cookie session (`POST /_session`)
    Session {
        /// Full URL of the `_session` endpoint
        session_url: String,
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Cloudant IAM api key exchanged for a bearer token
    Iam {
        /// IAM api key
        api_key: String,
        /// Token endpoint URL
        token_url: String,
    },
}

impl AuthConfig {
    /// Create basic auth config
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create IAM auth config against the default token endpoint
    pub fn iam(api_key: impl Into<String>) -> Self {
        Self::Iam {
            api_key: api_key.into(),
            token_url: DEFAULT_IAM_TOKEN_URL.to_string(),
        }
    }

    /// Whether this auth type caches a token obtained from a login call
    pub fn uses_token(&self) -> bool {
        matches!(self, Self::Session { .. } | Self::Iam { .. })
    }
}

/// Cached credential with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// Bearer token or session cookie value
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(30);
                Utc::now() + buffer >= expires_at
            }
            None => false,
        }
    }
}
