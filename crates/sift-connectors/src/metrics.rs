//! Prometheus counters for upstream search traffic.

use std::sync::Arc;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Counters shared by every scan issued through one engine.
///
/// Cloning is cheap; clones update the same underlying counters.
#[derive(Clone)]
pub struct SearchMetrics {
    pub upstream_requests: Counter,
    pub upstream_retries: Counter,
    pub records_fetched: Counter,
    pub scans_failed: Counter,
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for SearchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchMetrics")
            .field("upstream_requests", &self.upstream_requests.get())
            .field("upstream_retries", &self.upstream_retries.get())
            .field("records_fetched", &self.records_fetched.get())
            .field("scans_failed", &self.scans_failed.get())
            .finish()
    }
}

impl SearchMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let upstream_requests = Counter::default();
        registry.register(
            "sift_upstream_requests",
            "HTTP requests issued to the search API, retries included",
            upstream_requests.clone(),
        );

        let upstream_retries = Counter::default();
        registry.register(
            "sift_upstream_retries",
            "Requests repeated after a retryable failure",
            upstream_retries.clone(),
        );

        let records_fetched = Counter::default();
        registry.register(
            "sift_records_fetched",
            "Result records accumulated by completed scans",
            records_fetched.clone(),
        );

        let scans_failed = Counter::default();
        registry.register(
            "sift_scans_failed",
            "Scans that ended with a fatal error",
            scans_failed.clone(),
        );

        Self {
            upstream_requests,
            upstream_retries,
            records_fetched,
            scans_failed,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode_metrics(&self) -> String {
        let mut buf = String::new();
        if encode(&mut buf, &self.registry).is_err() {
            buf.clear();
        }
        buf
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
