//! Authentication module
//!
//! Supports: Basic, CouchDB cookie sessions, Cloudant IAM api keys
//!
//! The `Authenticator` handles all auth types and manages token caching
//! for auth types that require a login call.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, DEFAULT_IAM_TOKEN_URL, SESSION_LIFETIME_SECONDS};

#[cfg(test)]
mod tests;
