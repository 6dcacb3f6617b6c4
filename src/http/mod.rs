//! HTTP client module
//!
//! Provides the HTTP transport with retry, rate limiting, and backoff.
//!
//! # Features
//!
//! - **Automatic Retries**: Transient failures (429, 5xx, timeouts, refused
//!   connections) are retried with backoff before an error surfaces; writes
//!   that may not be resent use [`RetryPolicy::UnprocessedOnly`]
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Authentication**: Integration with the auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig, RetryPolicy};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
