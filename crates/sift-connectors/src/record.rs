//! Parsing of search API response bodies into flat records.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::SearchError;
use crate::filter::parse_datetime_text;
use crate::request::SearchKind;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebRecord {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub display_link: String,
    pub formatted_url: String,
    pub html_formatted_url: String,
    pub html_title: String,
    pub html_snippet: String,
    pub mime: String,
    pub file_format: String,
    /// The raw `pagemap` object serialized back to JSON, or empty.
    pub pagemap: String,
    pub site: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRecord {
    pub title: String,
    pub link: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub width: i32,
    pub height: i32,
    pub thumbnail_width: i32,
    pub thumbnail_height: i32,
    pub context_link: String,
    pub mime: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRecord {
    Web(WebRecord),
    Image(ImageRecord),
}

/// One parsed page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<FetchedRecord>,
    /// Continuation token: the next 1-based start index, if any.
    pub next_start: Option<u32>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default)]
    queries: Option<Queries>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Queries {
    #[serde(default, rename = "nextPage")]
    next_page: Vec<NextPage>,
}

#[derive(Deserialize)]
struct NextPage {
    #[serde(default, rename = "startIndex")]
    start_index: Option<i64>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

pub fn parse_page(kind: SearchKind, body: &str) -> Result<Page, SearchError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| SearchError::MalformedResponse(e.to_string()))?;

    if let Some(err) = envelope.error {
        return Err(SearchError::Api(
            err.message.unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }

    let items = envelope.items.unwrap_or_default();
    if items.is_empty() {
        return Ok(Page {
            records: Vec::new(),
            next_start: None,
        });
    }

    let records = items
        .iter()
        .map(|item| match kind {
            SearchKind::Web => FetchedRecord::Web(web_record(item)),
            SearchKind::Image => FetchedRecord::Image(image_record(item)),
        })
        .collect();

    let next_start = envelope
        .queries
        .and_then(|q| q.next_page.into_iter().next())
        .and_then(|p| p.start_index)
        .and_then(|i| u32::try_from(i).ok())
        .filter(|i| *i > 0);

    Ok(Page {
        records,
        next_start,
    })
}

fn str_field(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(obj: &Value, key: &str) -> i32 {
    obj.get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

fn web_record(item: &Value) -> WebRecord {
    let link = str_field(item, "link");
    let pagemap = item.get("pagemap");
    WebRecord {
        title: str_field(item, "title"),
        site: extract_domain(&link),
        snippet: str_field(item, "snippet"),
        display_link: str_field(item, "displayLink"),
        formatted_url: str_field(item, "formattedUrl"),
        html_formatted_url: str_field(item, "htmlFormattedUrl"),
        html_title: str_field(item, "htmlTitle"),
        html_snippet: str_field(item, "htmlSnippet"),
        mime: str_field(item, "mime"),
        file_format: str_field(item, "fileFormat"),
        pagemap: pagemap.map(Value::to_string).unwrap_or_default(),
        date: pagemap.and_then(page_date),
        link,
    }
}

fn image_record(item: &Value) -> ImageRecord {
    let link = str_field(item, "link");
    let image = item.get("image").cloned().unwrap_or(Value::Null);
    ImageRecord {
        title: str_field(item, "title"),
        image_url: link.clone(),
        link,
        thumbnail_url: str_field(&image, "thumbnailLink"),
        width: int_field(&image, "width"),
        height: int_field(&image, "height"),
        thumbnail_width: int_field(&image, "thumbnailWidth"),
        thumbnail_height: int_field(&image, "thumbnailHeight"),
        context_link: str_field(&image, "contextLink"),
        mime: str_field(item, "mime"),
        snippet: str_field(item, "snippet"),
    }
}

/// Host portion of a URL, without user info or port.
pub fn extract_domain(url: &str) -> String {
    if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        return host;
    }
    let rest = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url,
    };
    match rest.find('/') {
        Some(end) => rest[..end].to_string(),
        None => rest.to_string(),
    }
}

const DATE_METATAGS: [&str; 7] = [
    "article:published_time",
    "article:modified_time",
    "og:updated_time",
    "datepublished",
    "date",
    "pubdate",
    "dc.date",
];

/// Page date from the first metatags entry, normalized to RFC 3339 UTC.
fn page_date(pagemap: &Value) -> Option<String> {
    let tags = pagemap.get("metatags")?.as_array()?.first()?;
    DATE_METATAGS
        .iter()
        .filter_map(|key| tags.get(*key).and_then(Value::as_str))
        .find_map(parse_datetime_text)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}
