//! Typed errors for the connectors crate.

use thiserror::Error;

/// Errors that can occur while planning or fetching a search scan.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Missing credentials or a malformed option. Never retried.
    #[error("config error: {0}")]
    Config(String),
    /// Retryable transport failures outlasted the retry policy.
    #[error("upstream unavailable: max retries exceeded for URL: {url}")]
    RetriesExhausted { url: String },
    /// HTTP 401 from the search API.
    #[error("search API: invalid API key")]
    InvalidApiKey,
    /// HTTP 403 from the search API.
    #[error("search API: access denied or quota exceeded{}", detail(.0))]
    AccessDenied(Option<String>),
    /// HTTP 400 from the search API.
    #[error("search API: invalid request - {0}")]
    InvalidRequest(String),
    /// Any other terminal, non-success status.
    #[error("search API error: {reason} (status {status})")]
    Upstream { status: i32, reason: String },
    /// HTTP 200 carrying an `error` object.
    #[error("search API error: {0}")]
    Api(String),
    /// The response body could not be parsed.
    #[error("malformed search API response: {0}")]
    MalformedResponse(String),
    /// The HTTP client itself could not be constructed.
    #[error("http client error: {0}")]
    Http(String),
}

fn detail(reason: &Option<String>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!(" - {}", r),
        _ => String::new(),
    }
}

impl SearchError {
    /// Whether this error came from configuration rather than the upstream API.
    pub fn is_config(&self) -> bool {
        matches!(self, SearchError::Config(_))
    }
}

impl From<SearchError> for datafusion::error::DataFusionError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Config(msg) => datafusion::error::DataFusionError::Plan(msg),
            other => datafusion::error::DataFusionError::External(Box::new(other)),
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_names_url() {
        let err = SearchError::RetriesExhausted {
            url: "https://example.test/v1?q=rust".to_string(),
        };
        assert!(err.to_string().contains("https://example.test/v1?q=rust"));
    }

    #[test]
    fn test_access_denied_with_and_without_reason() {
        assert_eq!(
            SearchError::AccessDenied(None).to_string(),
            "search API: access denied or quota exceeded"
        );
        assert_eq!(
            SearchError::AccessDenied(Some("Daily Limit Exceeded".into())).to_string(),
            "search API: access denied or quota exceeded - Daily Limit Exceeded"
        );
    }

    #[test]
    fn test_config_maps_to_plan_error() {
        let df: datafusion::error::DataFusionError = SearchError::Config("no key".into()).into();
        assert!(matches!(df, datafusion::error::DataFusionError::Plan(_)));
        assert!(SearchError::Config("x".into()).is_config());
        assert!(!SearchError::InvalidApiKey.is_config());
    }

    #[test]
    fn test_upstream_error_to_external() {
        let df: datafusion::error::DataFusionError = SearchError::Api("Bad cx".into()).into();
        assert!(df.to_string().contains("Bad cx"));
    }
}
