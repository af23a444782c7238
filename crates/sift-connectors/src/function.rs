//! `google_search(...)` and `google_image_search(...)` table functions.
//!
//! Arguments are a search phrase followed by any number of `'key=value'`
//! option strings, e.g.
//! `google_search('rust async', 'country=us', 'file_type=pdf')`.

use std::sync::Arc;

use chrono::Utc;
use datafusion::catalog::{TableFunctionImpl, TableProvider};
use datafusion::common::ScalarValue;
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::prelude::Expr;
use tracing::info;

use crate::credentials::CredentialResolver;
use crate::error::SearchError;
use crate::request::{FilterSet, SearchKind, SearchRequest};
use crate::table::SearchTable;
use crate::transport::Transport;

#[derive(Debug)]
pub struct SearchTableFunction {
    kind: SearchKind,
    endpoint: String,
    transport: Transport,
    credentials: Arc<dyn CredentialResolver>,
}

impl SearchTableFunction {
    pub fn new(
        kind: SearchKind,
        endpoint: impl Into<String>,
        transport: Transport,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            transport,
            credentials,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.function_name()
    }

    /// Bind a request from literal arguments. Credentials are resolved here,
    /// so a missing key fails before any fetch.
    pub fn bind(&self, args: &[Expr]) -> Result<SearchRequest, SearchError> {
        let name = self.name();
        let (phrase, options) = match args.split_first() {
            Some((first, rest)) => (
                string_arg(first).ok_or_else(|| {
                    SearchError::Config(format!("{}() search query must be a string literal", name))
                })?,
                rest,
            ),
            None => {
                return Err(SearchError::Config(format!(
                    "{}() requires a search query",
                    name
                )))
            }
        };

        let credentials = self.credentials.resolve()?;
        let mut builder = SearchRequest::builder(self.kind, phrase, credentials)
            .endpoint(self.endpoint.clone())
            .reference_time(Utc::now());

        for arg in options {
            let raw = string_arg(arg).ok_or_else(|| {
                SearchError::Config(format!("{}() options must be 'key=value' strings", name))
            })?;
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                SearchError::Config(format!("{}() option '{}' is not key=value", name, raw))
            })?;
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();

            if key == "max_results" {
                let cap: usize = value.parse().ok().filter(|n| *n > 0).ok_or_else(|| {
                    SearchError::Config(format!(
                        "{}() max_results must be a positive integer, got '{}'",
                        name, value
                    ))
                })?;
                builder = builder.row_cap(cap);
            } else {
                apply_option(self.kind, builder.filters_mut(), &key, value)
                    .map_err(|e| SearchError::Config(format!("{}(): {}", name, e)))?;
            }
        }

        Ok(builder.build())
    }
}

impl TableFunctionImpl for SearchTableFunction {
    fn call(&self, args: &[Expr]) -> DFResult<Arc<dyn TableProvider>> {
        let request = self.bind(args).map_err(DataFusionError::from)?;
        info!(
            "Bound {}({:?}) with row_cap={}",
            self.name(),
            request.phrase,
            request.row_cap
        );
        Ok(Arc::new(SearchTable::new(request, self.transport.clone())))
    }
}

fn string_arg(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(ScalarValue::Utf8(Some(s)))
        | Expr::Literal(ScalarValue::LargeUtf8(Some(s)))
        | Expr::Literal(ScalarValue::Utf8View(Some(s))) => Some(s.clone()),
        _ => None,
    }
}

/// Store one named option in `filters`. Keys are lowercase.
pub fn apply_option(
    kind: SearchKind,
    filters: &mut FilterSet,
    key: &str,
    value: String,
) -> Result<(), String> {
    let slot = match (kind, key) {
        (_, "exact_terms") => &mut filters.exact_terms,
        (_, "exclude_terms") => &mut filters.exclude_terms,
        (_, "safe") => &mut filters.safe,
        (_, "rights") => &mut filters.rights,
        (SearchKind::Web, "or_terms") => &mut filters.or_terms,
        (SearchKind::Web, "file_type") => &mut filters.file_type,
        (SearchKind::Web, "country") => &mut filters.country,
        (SearchKind::Web, "language") => &mut filters.language,
        (SearchKind::Web, "interface_language") => &mut filters.interface_language,
        (SearchKind::Web, "sort") => &mut filters.sort,
        (SearchKind::Web, "structured_data") => &mut filters.structured_data,
        (SearchKind::Image, "site") => &mut filters.site_search,
        (SearchKind::Image, "date_restrict") => &mut filters.date_restrict,
        (SearchKind::Image, "img_size") => &mut filters.img_size,
        (SearchKind::Image, "img_type") => &mut filters.img_type,
        (SearchKind::Image, "img_color_type") => &mut filters.img_color_type,
        (SearchKind::Image, "img_dominant_color") => &mut filters.img_dominant_color,
        _ => return Err(format!("unknown option '{}'", key)),
    };
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::credentials::{SearchCredentials, StaticCredentials};
    use crate::metrics::SearchMetrics;
    use crate::scripted::ScriptedFetcher;
    use datafusion::logical_expr::lit;

    fn function(kind: SearchKind) -> SearchTableFunction {
        let transport = Transport::new(
            Arc::new(ScriptedFetcher::new(vec![])),
            RetryPolicy::default(),
            SearchMetrics::new(),
        );
        SearchTableFunction::new(
            kind,
            "https://search.test/v1",
            transport,
            Arc::new(StaticCredentials(SearchCredentials::new("k", "c").unwrap())),
        )
    }

    #[test]
    fn test_bind_web_options() {
        let req = function(SearchKind::Web)
            .bind(&[
                lit("rust"),
                lit("country=us"),
                lit("LANGUAGE = lang_en"),
                lit("structured_data=more:pagemap:document-author:john"),
                lit("max_results=250"),
            ])
            .unwrap();
        assert_eq!(req.phrase, "rust");
        assert_eq!(req.endpoint, "https://search.test/v1");
        assert_eq!(req.filters.country.as_deref(), Some("us"));
        assert_eq!(req.filters.language.as_deref(), Some("lang_en"));
        assert_eq!(
            req.filters.structured_data.as_deref(),
            Some("more:pagemap:document-author:john")
        );
        assert_eq!(req.row_cap, 250);
    }

    #[test]
    fn test_bind_image_options() {
        let req = function(SearchKind::Image)
            .bind(&[lit("ferris"), lit("site=rustacean.net"), lit("img_size=large")])
            .unwrap();
        assert_eq!(req.filters.site_search.as_deref(), Some("rustacean.net"));
        assert_eq!(req.filters.img_size.as_deref(), Some("large"));
    }

    #[test]
    fn test_option_not_valid_for_kind() {
        let err = function(SearchKind::Image)
            .bind(&[lit("ferris"), lit("country=us")])
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("unknown option 'country'"));

        let err = function(SearchKind::Web)
            .bind(&[lit("rust"), lit("img_size=large")])
            .unwrap_err();
        assert!(err.to_string().contains("img_size"));
    }

    #[test]
    fn test_bind_errors() {
        let f = function(SearchKind::Web);
        assert!(f.bind(&[]).unwrap_err().to_string().contains("requires a search query"));
        assert!(f.bind(&[lit(5)]).unwrap_err().is_config());
        assert!(f.bind(&[lit("rust"), lit("country")]).unwrap_err().is_config());
        assert!(f.bind(&[lit("rust"), lit("max_results=0")]).unwrap_err().is_config());
    }

    #[derive(Debug)]
    struct NoCredentials;

    impl CredentialResolver for NoCredentials {
        fn resolve(&self) -> Result<SearchCredentials, SearchError> {
            Err(SearchError::Config("no search credentials".into()))
        }
    }

    #[test]
    fn test_missing_credentials_fail_at_bind() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let transport = Transport::new(fetcher.clone(), RetryPolicy::default(), SearchMetrics::new());
        let f = SearchTableFunction::new(
            SearchKind::Web,
            "https://search.test/v1",
            transport,
            Arc::new(NoCredentials),
        );
        let err = f.call(&[lit("rust")]).unwrap_err();
        assert!(err.to_string().contains("no search credentials"));
        assert!(fetcher.requests().is_empty());
    }
}
