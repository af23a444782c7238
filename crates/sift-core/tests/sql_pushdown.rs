//! SQL over search table functions, end to end against a scripted API.

use std::sync::Arc;

use datafusion::arrow::util::pretty::pretty_format_batches;
use sift_connectors::scripted::{web_page, ScriptedFetcher};
use sift_connectors::{
    CredentialResolver, RawResponse, RetryPolicy, SearchConfig, SearchCredentials, SearchError,
    SearchMetrics, StaticCredentials,
};
use sift_core::{RecordBatch, SearchEngine};
use url::Url;

fn config() -> SearchConfig {
    SearchConfig {
        endpoint: "https://search.test/customsearch/v1".to_string(),
        retry: RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2,
        },
        request_timeout_secs: 5,
    }
}

fn engine(fetcher: Arc<ScriptedFetcher>) -> SearchEngine {
    SearchEngine::new(
        &config(),
        fetcher,
        Arc::new(StaticCredentials(
            SearchCredentials::new("test-key", "test-cx").unwrap(),
        )),
        SearchMetrics::new(),
    )
}

fn param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Ten results per page under `domain`, continuing up to the API ceiling.
fn paged_api(domain: &'static str) -> Arc<ScriptedFetcher> {
    Arc::new(ScriptedFetcher::with_handler(move |url| {
        let start: u32 = param(url, "start").and_then(|s| s.parse().ok()).unwrap_or(1);
        RawResponse::ok(web_page(domain, start, 10, Some(start + 10)))
    }))
}

fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

#[tokio::test]
async fn limit_bounds_upstream_pages() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect("SELECT title, site FROM google_search('rust programming') LIMIT 15")
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 15);
    assert_eq!(
        fetcher.param_values("start"),
        vec![Some("1".to_string()), Some("11".to_string())]
    );
    assert_eq!(engine.metrics().upstream_requests.get(), 2);
    assert_eq!(engine.metrics().records_fetched.get(), 15);
}

#[tokio::test]
async fn no_limit_stops_at_default_cap() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect("SELECT link FROM google_search('rust')")
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 100);
    assert_eq!(fetcher.requests().len(), 10);
}

#[tokio::test]
async fn explain_shows_narrowed_scan() {
    let engine = engine(paged_api("rust-lang.org"));

    let batches = engine
        .collect("EXPLAIN SELECT title FROM google_search('rust programming') LIMIT 15")
        .await
        .unwrap();
    let plan = pretty_format_batches(&batches).unwrap().to_string();

    assert!(plan.contains("SearchScanExec"), "{}", plan);
    assert!(plan.contains("row_cap=15"), "{}", plan);
}

#[tokio::test]
async fn site_like_suffix_becomes_site_clause() {
    let fetcher = paged_api("docs.example.com");
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect("SELECT link FROM google_search('rust') WHERE site LIKE '%.example.com' LIMIT 5")
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 5);
    assert_eq!(
        fetcher.param_values("q")[0].as_deref(),
        Some("rust site:example.com")
    );
}

#[tokio::test]
async fn site_equality_becomes_site_clause() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title FROM google_search('async') WHERE site = 'rust-lang.org' LIMIT 3")
        .await
        .unwrap();

    assert_eq!(
        fetcher.param_values("q")[0].as_deref(),
        Some("async site:rust-lang.org")
    );
    assert_eq!(fetcher.requests().len(), 1);
}

#[tokio::test]
async fn site_inequality_excludes_domain() {
    let fetcher = paged_api("docs.rs");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title FROM google_search('serde') WHERE site <> 'reddit.com' LIMIT 3")
        .await
        .unwrap();

    assert_eq!(
        fetcher.param_values("q")[0].as_deref(),
        Some("serde -site:reddit.com")
    );
}

#[tokio::test]
async fn site_in_list_becomes_combined_clause() {
    for sql in [
        "SELECT title FROM google_search('x') WHERE site IN ('a.com', 'b.com') LIMIT 5",
        "SELECT title FROM google_search('x') WHERE site = 'a.com' OR site = 'b.com' LIMIT 5",
    ] {
        let fetcher = paged_api("a.com");
        let engine = engine(fetcher.clone());

        let batches = engine.collect(sql).await.unwrap();

        assert_eq!(row_count(&batches), 5, "{}", sql);
        assert_eq!(
            fetcher.param_values("q")[0].as_deref(),
            Some("x (site:a.com OR site:b.com)"),
            "{}",
            sql
        );
        assert_eq!(fetcher.requests().len(), 1, "{}", sql);
    }
}

#[tokio::test]
async fn many_sites_past_one_query_alternate_partitions() {
    let fetcher = Arc::new(ScriptedFetcher::with_handler(|url| {
        let start: u32 = param(url, "start").and_then(|s| s.parse().ok()).unwrap_or(1);
        match param(url, "siteSearch") {
            Some(domain) => RawResponse::ok(web_page(&domain, start, 10, Some(start + 10))),
            None => RawResponse::status(400, "expected a per-site request"),
        }
    }));
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect(
            "SELECT site FROM google_search('x', 'max_results=150') WHERE site IN ('a.com', 'b.com')",
        )
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 150);
    let partitions = fetcher.param_values("siteSearch");
    assert_eq!(partitions.len(), 15);
    for (i, site) in partitions.iter().enumerate() {
        let expected = if i % 2 == 0 { "a.com" } else { "b.com" };
        assert_eq!(site.as_deref(), Some(expected), "request {}", i);
    }
    assert!(fetcher.param_values("q").iter().all(|q| q.as_deref() == Some("x")));
}

#[tokio::test]
async fn order_by_alias_of_other_column_is_not_pushed() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title AS date FROM google_search('rust') ORDER BY date")
        .await
        .unwrap();

    assert!(!fetcher.requests().is_empty());
    assert!(fetcher.param_values("sort").iter().all(Option::is_none));
}

#[tokio::test]
async fn order_by_renamed_date_is_pushed() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title, date AS published FROM google_search('rust') ORDER BY published DESC")
        .await
        .unwrap();

    let sorts = fetcher.param_values("sort");
    assert!(!sorts.is_empty());
    assert!(sorts.iter().all(|s| s.as_deref() == Some("date:d")));
}

#[tokio::test]
async fn order_by_date_sets_sort_token() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title, date FROM google_search('rust') ORDER BY date DESC")
        .await
        .unwrap();

    let sorts = fetcher.param_values("sort");
    assert!(!sorts.is_empty());
    assert!(sorts.iter().all(|s| s.as_deref() == Some("date:d")));
}

#[tokio::test]
async fn explicit_sort_option_wins_over_order_by() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    engine
        .collect("SELECT title, date FROM google_search('rust', 'sort=date:r:20240101:20241231') ORDER BY date")
        .await
        .unwrap();

    assert_eq!(
        fetcher.param_values("sort")[0].as_deref(),
        Some("date:r:20240101:20241231")
    );
}

#[tokio::test]
async fn date_lower_bound_restricts_and_still_filters() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    // scripted pages carry no date metadata, so the retained filter drops every row
    let batches = engine
        .collect("SELECT title FROM google_search('rust') WHERE date >= '2024-01-01'")
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 0);
    let restrict = fetcher.param_values("dateRestrict");
    assert!(!restrict.is_empty());
    assert!(restrict[0].as_deref().is_some_and(|t| t.starts_with('y') || t.starts_with('m')));
}

#[tokio::test]
async fn options_reach_the_request() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect(
            "SELECT title FROM google_search('rust', 'country=us', 'file_type=pdf', 'max_results=20')",
        )
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 20);
    assert_eq!(fetcher.requests().len(), 2);
    assert_eq!(fetcher.param_values("gl")[0].as_deref(), Some("us"));
    assert_eq!(fetcher.param_values("fileType")[0].as_deref(), Some("pdf"));
}

#[tokio::test]
async fn unknown_option_is_a_planning_error() {
    let fetcher = paged_api("rust-lang.org");
    let engine = engine(fetcher.clone());

    let err = engine
        .collect("SELECT title FROM google_search('rust', 'colour=blue')")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown option 'colour'"));
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn image_search_returns_typed_dimensions() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![RawResponse::ok(
        serde_json::json!({
            "items": [{
                "title": "Ferris",
                "link": "https://rustacean.net/assets/rustacean-flat-happy.png",
                "mime": "image/png",
                "image": {
                    "contextLink": "https://rustacean.net/",
                    "width": 1200,
                    "height": 800,
                    "thumbnailLink": "https://thumbs.test/ferris.png",
                    "thumbnailWidth": 150,
                    "thumbnailHeight": 100
                }
            }]
        })
        .to_string(),
    )]));
    let engine = engine(fetcher.clone());

    let batches = engine
        .collect("SELECT image_url, width, height FROM google_image_search('ferris', 'img_size=large')")
        .await
        .unwrap();

    assert_eq!(row_count(&batches), 1);
    let table = pretty_format_batches(&batches).unwrap().to_string();
    assert!(table.contains("rustacean-flat-happy.png"));
    assert!(table.contains("1200"));
    assert_eq!(fetcher.param_values("searchType")[0].as_deref(), Some("image"));
    assert_eq!(fetcher.param_values("imgSize")[0].as_deref(), Some("large"));
}

#[tokio::test]
async fn upstream_exhaustion_fails_the_query() {
    let fetcher = Arc::new(ScriptedFetcher::repeating(RawResponse::status(503, "")));
    let engine = engine(fetcher.clone());

    let err = engine
        .collect("SELECT title FROM google_search('rust') LIMIT 5")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("max retries exceeded"));
    assert_eq!(fetcher.requests().len(), 3);
    assert_eq!(engine.metrics().scans_failed.get(), 1);
}

#[derive(Debug)]
struct Unconfigured;

impl CredentialResolver for Unconfigured {
    fn resolve(&self) -> Result<SearchCredentials, SearchError> {
        Err(SearchError::Config(
            "set GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_CX".into(),
        ))
    }
}

#[tokio::test]
async fn missing_credentials_fail_before_fetch() {
    let fetcher = paged_api("rust-lang.org");
    let engine = SearchEngine::new(
        &config(),
        fetcher.clone(),
        Arc::new(Unconfigured),
        SearchMetrics::new(),
    );

    let err = engine
        .collect("SELECT title FROM google_search('rust')")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("GOOGLE_SEARCH_API_KEY"));
    assert!(fetcher.requests().is_empty());
}
