//! Search engine built on DataFusion

use std::sync::Arc;

use datafusion::arrow::record_batch::RecordBatch;
use datafusion::error::Result as DFResult;
use datafusion::prelude::*;
use sift_connectors::{
    CredentialResolver, EnvCredentials, HttpFetcher, ReqwestFetcher, SearchConfig, SearchKind,
    SearchMetrics, SearchPushdownRule, SearchTableFunction, Transport,
};
use tracing::info;

/// The main search engine wrapping DataFusion's SessionContext
pub struct SearchEngine {
    ctx: SessionContext,
    metrics: SearchMetrics,
}

impl SearchEngine {
    /// Create an engine with `google_search` and `google_image_search`
    /// registered against the given fetcher and credentials.
    pub fn new(
        config: &SearchConfig,
        fetcher: Arc<dyn HttpFetcher>,
        credentials: Arc<dyn CredentialResolver>,
        metrics: SearchMetrics,
    ) -> Self {
        let ctx = SessionContext::new();
        let transport = Transport::new(fetcher, config.retry, metrics.clone());

        for kind in [SearchKind::Web, SearchKind::Image] {
            let function = SearchTableFunction::new(
                kind,
                config.endpoint.clone(),
                transport.clone(),
                Arc::clone(&credentials),
            );
            ctx.register_udtf(function.name(), Arc::new(function));
        }
        ctx.add_optimizer_rule(Arc::new(SearchPushdownRule::new()));

        info!(
            "SearchEngine initialized: endpoint={}, max_retries={}",
            config.endpoint, config.retry.max_retries
        );

        Self { ctx, metrics }
    }

    /// Engine configured from `SIFT_*` variables, talking to the real API
    /// with credentials from `GOOGLE_SEARCH_API_KEY` / `GOOGLE_SEARCH_CX`.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = SearchConfig::from_env()?;
        let fetcher = ReqwestFetcher::new(&config)?;
        Ok(Self::new(
            &config,
            Arc::new(fetcher),
            Arc::new(EnvCredentials),
            SearchMetrics::new(),
        ))
    }

    /// Get a reference to the underlying SessionContext
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Upstream request and scan counters shared by every scan of this engine
    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// Plan a SQL query and return a DataFrame
    pub async fn sql(&self, query: &str) -> DFResult<DataFrame> {
        self.ctx.sql(query).await
    }

    /// Run a SQL query to completion
    pub async fn collect(&self, query: &str) -> DFResult<Vec<RecordBatch>> {
        self.sql(query).await?.collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_connectors::scripted::ScriptedFetcher;
    use sift_connectors::{SearchCredentials, StaticCredentials};

    fn engine(fetcher: Arc<ScriptedFetcher>) -> SearchEngine {
        SearchEngine::new(
            &SearchConfig::default(),
            fetcher,
            Arc::new(StaticCredentials(SearchCredentials::new("k", "c").unwrap())),
            SearchMetrics::new(),
        )
    }

    #[tokio::test]
    async fn test_engine_registers_table_functions() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let engine = engine(fetcher.clone());

        let web = engine.sql("SELECT title FROM google_search('rust')").await;
        assert!(web.is_ok());
        let image = engine.sql("SELECT width FROM google_image_search('ferris')").await;
        assert!(image.is_ok());

        // planning alone never reaches the upstream API
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_function_errors() {
        let engine = engine(Arc::new(ScriptedFetcher::new(vec![])));
        assert!(engine.sql("SELECT * FROM bing_search('rust')").await.is_err());
    }
}
