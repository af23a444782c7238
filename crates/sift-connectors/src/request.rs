//! Immutable description of one logical search scan.

use chrono::{DateTime, Utc};

use crate::config::DEFAULT_ENDPOINT;
use crate::credentials::SearchCredentials;

/// Results per upstream page; the API never returns more.
pub const PAGE_SIZE: u32 = 10;

/// Results the API will serve for one query (or one site in per-site mode).
pub const MAX_RESULTS_PER_QUERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Web,
    Image,
}

impl SearchKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            SearchKind::Web => "google_search",
            SearchKind::Image => "google_image_search",
        }
    }
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchKind::Web => write!(f, "web"),
            SearchKind::Image => write!(f, "image"),
        }
    }
}

/// Upstream filter values. Unset or empty values are never sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub exact_terms: Option<String>,
    pub exclude_terms: Option<String>,
    pub or_terms: Option<String>,
    pub file_type: Option<String>,
    /// `gl`
    pub country: Option<String>,
    /// `hl`
    pub interface_language: Option<String>,
    /// `lr`
    pub language: Option<String>,
    pub safe: Option<String>,
    pub rights: Option<String>,
    pub sort: Option<String>,
    /// Prepended to `q`, e.g. `more:pagemap:document-author:john`.
    pub structured_data: Option<String>,

    /// Bare domains, in the order they were absorbed.
    pub site_includes: Vec<String>,
    pub site_excludes: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    /// Recorded but not sent; the API only knows relative lower bounds.
    pub date_to: Option<DateTime<Utc>>,

    // Image search only.
    pub site_search: Option<String>,
    pub date_restrict: Option<String>,
    pub img_size: Option<String>,
    pub img_type: Option<String>,
    pub img_color_type: Option<String>,
    pub img_dominant_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub endpoint: String,
    pub kind: SearchKind,
    pub phrase: String,
    pub credentials: SearchCredentials,
    pub row_cap: usize,
    pub filters: FilterSet,
    /// "Now", captured when the request was bound.
    pub reference_time: DateTime<Utc>,
}

impl SearchRequest {
    pub fn builder(
        kind: SearchKind,
        phrase: impl Into<String>,
        credentials: SearchCredentials,
    ) -> SearchRequestBuilder {
        SearchRequestBuilder {
            request: SearchRequest {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                kind,
                phrase: phrase.into(),
                credentials,
                row_cap: MAX_RESULTS_PER_QUERY,
                filters: FilterSet::default(),
                reference_time: Utc::now(),
            },
        }
    }

    /// A copy with a different row cap.
    pub fn with_row_cap(&self, row_cap: usize) -> Self {
        Self {
            row_cap,
            ..self.clone()
        }
    }

    /// A copy carrying `token` as the sort value, unless one is already set.
    pub fn with_sort(&self, token: &str) -> Self {
        let mut next = self.clone();
        if next.filters.sort.as_deref().map_or(true, str::is_empty) {
            next.filters.sort = Some(token.to_string());
        }
        next
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
    request: SearchRequest,
}

impl SearchRequestBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.request.endpoint = endpoint.into();
        self
    }

    pub fn row_cap(mut self, row_cap: usize) -> Self {
        self.request.row_cap = row_cap;
        self
    }

    pub fn reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.request.reference_time = at;
        self
    }

    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.request.filters
    }

    pub fn build(self) -> SearchRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> SearchCredentials {
        SearchCredentials::new("k", "c").unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let req = SearchRequest::builder(SearchKind::Web, "rust", creds()).build();
        assert_eq!(req.row_cap, 100);
        assert_eq!(req.endpoint, DEFAULT_ENDPOINT);
        assert!(req.filters.site_includes.is_empty());
    }

    #[test]
    fn test_with_row_cap_leaves_original() {
        let req = SearchRequest::builder(SearchKind::Web, "rust", creds()).build();
        let narrowed = req.with_row_cap(15);
        assert_eq!(narrowed.row_cap, 15);
        assert_eq!(req.row_cap, 100);
    }

    #[test]
    fn test_with_sort_keeps_explicit_value() {
        let mut builder = SearchRequest::builder(SearchKind::Web, "rust", creds());
        builder.filters_mut().sort = Some("date:r:20240101:20241231".into());
        let req = builder.build();

        assert_eq!(
            req.with_sort("date:d").filters.sort.as_deref(),
            Some("date:r:20240101:20241231")
        );

        let plain = SearchRequest::builder(SearchKind::Web, "rust", creds()).build();
        assert_eq!(plain.with_sort("date:d").filters.sort.as_deref(), Some("date:d"));
    }
}
