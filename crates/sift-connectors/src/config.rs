//! Search configuration from environment variables.

use std::time::Duration;

use crate::error::SearchError;

/// Default endpoint of the Custom Search JSON API.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Retry/backoff policy applied to every upstream request.
///
/// Stateless and `Copy`; passed by value into each fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given zero-based attempt, before clamping.
    pub fn exponential_ms(&self, attempt: u32) -> u64 {
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        if raw.is_finite() && raw >= 0.0 {
            raw.min(u64::MAX as f64) as u64
        } else {
            self.max_backoff_ms
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL requests are issued against.
    pub endpoint: String,
    pub retry: RetryPolicy,
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, SearchError> {
        let defaults = RetryPolicy::default();
        Ok(Self {
            endpoint: std::env::var("SIFT_SEARCH_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            retry: RetryPolicy {
                max_retries: env_or("SIFT_MAX_RETRIES", defaults.max_retries)?,
                initial_backoff_ms: env_or("SIFT_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
                backoff_multiplier: env_or("SIFT_BACKOFF_MULTIPLIER", defaults.backoff_multiplier)?,
                max_backoff_ms: env_or("SIFT_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
            },
            request_timeout_secs: env_or("SIFT_REQUEST_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, SearchError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SearchError::Config(format!("Invalid {}: '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
