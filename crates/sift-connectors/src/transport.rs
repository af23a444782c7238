//! HTTP transport with retry and exponential backoff.
//!
//! A single network seam, [`HttpFetcher`], issues one GET per call. [`Transport`]
//! wraps it with the [`RetryPolicy`] and turns terminal statuses into typed
//! [`SearchError`]s. Nothing here knows about search semantics.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::config::{RetryPolicy, SearchConfig};
use crate::error::SearchError;
use crate::metrics::SearchMetrics;

/// Outcome of one GET. `status <= 0` means the request never got a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: i32,
    pub body: String,
    /// Raw `Retry-After` header value, if the server sent one.
    pub retry_after: Option<String>,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: i32, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues exactly one HTTP GET.
///
/// Implementations never fail: connection-level problems are reported as a
/// response with status 0 and the error text as the body.
#[async_trait]
pub trait HttpFetcher: Send + Sync + fmt::Debug {
    async fn get(&self, url: &Url) -> RawResponse;
}

/// Production fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &Url) -> RawResponse {
        let resp = match self.http.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => return RawResponse::status(0, e.to_string()),
        };
        let status = i32::from(resp.status().as_u16());
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match resp.text().await {
            Ok(body) => RawResponse {
                status,
                body,
                retry_after,
            },
            Err(e) => RawResponse::status(0, e.to_string()),
        }
    }
}

/// Connection failures, rate limiting and 5xx gateway errors are transient.
pub fn is_retryable(status: i32) -> bool {
    status <= 0 || status == 429 || (500..=504).contains(&status)
}

/// `Retry-After` in whole seconds, converted to milliseconds.
fn parse_retry_after(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(|secs| secs.saturating_mul(1000))
}

/// Delay before the next attempt after a retryable failure on `attempt`.
pub fn backoff_delay(
    policy: &RetryPolicy,
    attempt: u32,
    status: i32,
    retry_after: Option<&str>,
) -> Duration {
    let hinted = if status == 429 {
        retry_after.and_then(parse_retry_after)
    } else {
        None
    };
    let ms = hinted.unwrap_or_else(|| policy.exponential_ms(attempt));
    Duration::from_millis(ms.min(policy.max_backoff_ms))
}

/// Render a URL with the `key` parameter masked, for logs and errors.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "key") {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "key" { "REDACTED".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Pull `error.message` out of an API error body, if there is one.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

fn classify_failure(resp: &RawResponse) -> SearchError {
    let reason = error_message(&resp.body);
    match resp.status {
        401 => SearchError::InvalidApiKey,
        403 => SearchError::AccessDenied(reason),
        400 => SearchError::InvalidRequest(reason.unwrap_or_else(|| "bad request".to_string())),
        status => SearchError::Upstream {
            status,
            reason: reason.unwrap_or_else(|| {
                if resp.body.is_empty() {
                    "no response body".to_string()
                } else {
                    resp.body.chars().take(200).collect()
                }
            }),
        },
    }
}

/// Retrying wrapper around an [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct Transport {
    fetcher: Arc<dyn HttpFetcher>,
    policy: RetryPolicy,
    metrics: SearchMetrics,
}

impl Transport {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, policy: RetryPolicy, metrics: SearchMetrics) -> Self {
        Self {
            fetcher,
            policy,
            metrics,
        }
    }

    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// GET `url`, retrying transient failures per the policy.
    ///
    /// Returns the first 2xx response. Terminal statuses are returned as
    /// classified errors without consuming a retry.
    pub async fn fetch(&self, url: &Url) -> Result<RawResponse, SearchError> {
        let mut attempt = 0u32;
        loop {
            self.metrics.upstream_requests.inc();
            let resp = self.fetcher.get(url).await;

            if resp.is_success() {
                return Ok(resp);
            }
            if !is_retryable(resp.status) {
                debug!("Terminal status {} for {}", resp.status, redact_url(url));
                return Err(classify_failure(&resp));
            }
            if attempt >= self.policy.max_retries {
                return Err(SearchError::RetriesExhausted {
                    url: redact_url(url),
                });
            }

            let delay = backoff_delay(&self.policy, attempt, resp.status, resp.retry_after.as_deref());
            warn!(
                "Search request attempt {} failed with status {}; retrying in {:?}",
                attempt + 1,
                resp.status,
                delay
            );
            self.metrics.upstream_retries.inc();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
