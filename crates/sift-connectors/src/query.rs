//! Query compiler: turns a [`SearchRequest`] plus cursor position into a URL.
//!
//! Everything here is pure. The same request, start index and partition
//! always produce the same URL.

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::SearchError;
use crate::request::{FilterSet, SearchKind, SearchRequest, PAGE_SIZE};

const WEB_FIELDS: &str = "items(title,link,snippet,displayLink,formattedUrl,htmlFormattedUrl,htmlTitle,htmlSnippet,mime,fileFormat,pagemap),queries(nextPage)";
const IMAGE_FIELDS: &str = "items(title,link,snippet,mime,image),queries(nextPage)";

/// Build the GET URL for one page.
///
/// `partition` restricts the page to a single site via `siteSearch`; when it
/// is set, `combine_sites` is ignored. With `combine_sites`, included sites
/// are folded into `q` as a `site:` disjunction.
pub fn build_url(
    request: &SearchRequest,
    start: u32,
    partition: Option<&str>,
    combine_sites: bool,
) -> Result<Url, SearchError> {
    let mut url = Url::parse(&request.endpoint).map_err(|e| {
        SearchError::Config(format!("Invalid search endpoint '{}': {}", request.endpoint, e))
    })?;
    let filters = &request.filters;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("key", &request.credentials.api_key);
        pairs.append_pair("cx", &request.credentials.cx);

        match request.kind {
            SearchKind::Web => {
                let combine = combine_sites && partition.is_none();
                pairs.append_pair("q", &web_query_text(&request.phrase, filters, combine));
            }
            SearchKind::Image => {
                pairs.append_pair("q", &request.phrase);
                pairs.append_pair("searchType", "image");
            }
        }

        pairs.append_pair("num", &PAGE_SIZE.to_string());
        pairs.append_pair("start", &start.to_string());

        let site_search = match request.kind {
            SearchKind::Web => partition,
            SearchKind::Image => non_empty(&filters.site_search),
        };
        if let Some(site) = site_search {
            pairs.append_pair("siteSearch", site);
            pairs.append_pair("siteSearchFilter", "i");
        }

        let derived = filters
            .date_from
            .and_then(|from| date_restrict_token(request.reference_time, from));
        if let Some(token) = derived.as_deref().or(non_empty(&filters.date_restrict)) {
            pairs.append_pair("dateRestrict", token);
        }

        let named: Vec<(&str, &Option<String>)> = match request.kind {
            SearchKind::Web => vec![
                ("exactTerms", &filters.exact_terms),
                ("excludeTerms", &filters.exclude_terms),
                ("orTerms", &filters.or_terms),
                ("fileType", &filters.file_type),
                ("gl", &filters.country),
                ("hl", &filters.interface_language),
                ("lr", &filters.language),
                ("safe", &filters.safe),
                ("rights", &filters.rights),
                ("sort", &filters.sort),
            ],
            SearchKind::Image => vec![
                ("exactTerms", &filters.exact_terms),
                ("excludeTerms", &filters.exclude_terms),
                ("safe", &filters.safe),
                ("rights", &filters.rights),
                ("imgSize", &filters.img_size),
                ("imgType", &filters.img_type),
                ("imgColorType", &filters.img_color_type),
                ("imgDominantColor", &filters.img_dominant_color),
            ],
        };
        for (name, value) in named {
            if let Some(v) = non_empty(value) {
                pairs.append_pair(name, v);
            }
        }

        let fields = match request.kind {
            SearchKind::Web => WEB_FIELDS,
            SearchKind::Image => IMAGE_FIELDS,
        };
        pairs.append_pair("fields", fields);
    }

    Ok(url)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn web_query_text(phrase: &str, filters: &FilterSet, combine_sites: bool) -> String {
    let mut q = match non_empty(&filters.structured_data) {
        Some(prefix) => format!("{} {}", prefix, phrase),
        None => phrase.to_string(),
    };

    if combine_sites {
        match filters.site_includes.as_slice() {
            [] => {}
            [only] => {
                q.push_str(" site:");
                q.push_str(only);
            }
            sites => {
                let clause = sites
                    .iter()
                    .map(|s| format!("site:{}", s))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                q.push_str(&format!(" ({})", clause));
            }
        }
    }

    for site in &filters.site_excludes {
        q.push_str(" -site:");
        q.push_str(site);
    }
    q
}

/// Relative `dateRestrict` token covering `from` up to `reference`.
///
/// Returns `None` when `from` is not in the past.
pub fn date_restrict_token(reference: DateTime<Utc>, from: DateTime<Utc>) -> Option<String> {
    let days = (reference - from).num_seconds() / 86_400;
    let token = match days {
        d if d <= 0 => return None,
        d if d <= 7 => format!("d{}", d),
        d if d <= 31 => format!("w{}", (d + 6) / 7),
        d if d <= 365 => format!("m{}", (d + 29) / 30),
        d => format!("y{}", (d + 364) / 365),
    };
    Some(token)
}
