//! Authenticator implementation
//!
//! Handles applying authentication to requests and managing token refresh.

use super::types::{AuthConfig, CachedToken, SESSION_LIFETIME_SECONDS};
use crate::error::{Error, Result};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Authenticator handles applying authentication to HTTP requests
pub struct Authenticator {
    /// Auth configuration
    config: AuthConfig,
    /// Cached token for Session/IAM auth
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Get the auth configuration
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::None => Ok(req),

            AuthConfig::Basic { username, password } => {
                Ok(req.basic_auth(username, Some(password)))
            }

            AuthConfig::Session { .. } => {
                let cookie = self.get_or_refresh_token().await?;
                Ok(req.header(COOKIE, cookie))
            }

            AuthConfig::Iam { .. } => {
                let token = self.get_or_refresh_token().await?;
                Ok(req.bearer_auth(token))
            }
        }
    }

    /// Drop the cached token so the next request logs in again
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.fetch_new_token().await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    /// Fetch a new token based on auth type
    async fn fetch_new_token(&self) -> Result<CachedToken> {
        match &self.config {
            AuthConfig::Session {
                session_url,
                username,
                password,
            } => self.fetch_session(session_url, username, password).await,
            AuthConfig::Iam { api_key, token_url } => self.fetch_iam(token_url, api_key).await,
            _ => Err(Error::auth("Auth type does not use tokens")),
        }
    }

    /// Log in with `POST /_session` and keep the `AuthSession` cookie
    async fn fetch_session(
        &self,
        session_url: &str,
        username: &str,
        password: &str,
    ) -> Result<CachedToken> {
        debug!("Opening cookie session at {session_url}");

        let response = self
            .http_client
            .post(session_url)
            .json(&json!({ "name": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "Session login failed with {}: {body}",
                status.as_u16()
            )));
        }

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(extract_session_cookie)
            .ok_or_else(|| Error::auth("Session response did not set AuthSession cookie"))?;

        Ok(CachedToken::expires_in(cookie, SESSION_LIFETIME_SECONDS))
    }

    /// Exchange an IAM api key for a bearer token
    async fn fetch_iam(&self, token_url: &str, api_key: &str) -> Result<CachedToken> {
        debug!("Requesting IAM token from {token_url}");

        let response = self
            .http_client
            .post(token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", api_key),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "IAM token request failed with {}: {body}",
                status.as_u16()
            )));
        }

        let token: IamTokenResponse = response.json().await?;
        Ok(match token.expires_in {
            Some(seconds) => CachedToken::expires_in(token.access_token, seconds),
            None => CachedToken::new(token.access_token, None),
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.config {
            AuthConfig::None => "none",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Session { .. } => "session",
            AuthConfig::Iam { .. } => "iam",
        };
        f.debug_struct("Authenticator")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Pull `AuthSession=<value>` out of a `Set-Cookie` header
pub(crate) fn extract_session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find(|part| part.starts_with("AuthSession="))
        .filter(|part| part.len() > "AuthSession=".len())
        .map(ToString::to_string)
}
