//! Pagination engine: drives the query compiler and transport until the row
//! cap is met or every cursor is exhausted.
//!
//! Combined and per-site scans share one loop; a [`PartitionStrategy`]
//! decides how many cursors there are and how each page URL is built.

use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::SearchError;
use crate::query::build_url;
use crate::record::{parse_page, FetchedRecord};
use crate::request::{SearchRequest, MAX_RESULTS_PER_QUERY};
use crate::transport::{redact_url, Transport};

/// Highest start index the API will serve.
const MAX_START_INDEX: u32 = MAX_RESULTS_PER_QUERY as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// One cursor; sites (if any) are folded into the query text.
    Combined { combine_sites: bool },
    /// One cursor per included site, visited in circular order.
    RoundRobin { partitions: Vec<String> },
}

impl PartitionStrategy {
    pub fn for_request(request: &SearchRequest) -> Self {
        let sites = &request.filters.site_includes;
        if sites.len() > 1 && request.row_cap > MAX_RESULTS_PER_QUERY {
            PartitionStrategy::RoundRobin {
                partitions: sites.clone(),
            }
        } else {
            PartitionStrategy::Combined {
                combine_sites: !sites.is_empty(),
            }
        }
    }

    fn cursor_count(&self) -> usize {
        match self {
            PartitionStrategy::Combined { .. } => 1,
            PartitionStrategy::RoundRobin { partitions } => partitions.len(),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            PartitionStrategy::Combined { .. } => "combined",
            PartitionStrategy::RoundRobin { .. } => "round-robin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    next_start: u32,
    exhausted: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            next_start: 1,
            exhausted: false,
        }
    }
}

impl Cursor {
    /// Move past a page fetched at `used_start`. Once exhausted, never resumes.
    fn advance(&mut self, used_start: u32, item_count: usize, next: Option<u32>) {
        match next {
            Some(token)
                if item_count > 0
                    && used_start < MAX_START_INDEX
                    && token > used_start
                    && token <= MAX_START_INDEX =>
            {
                self.next_start = token;
            }
            _ => self.exhausted = true,
        }
    }
}

/// Index of the first non-exhausted cursor at or after `from`, circularly.
fn next_active(cursors: &[Cursor], from: usize) -> Option<usize> {
    let n = cursors.len();
    (0..n)
        .map(|offset| (from + offset) % n)
        .find(|&i| !cursors[i].exhausted)
}

/// Fetch up to `request.row_cap` records.
///
/// All-or-nothing: any fatal error discards what was accumulated so far.
pub async fn run_scan(
    request: &SearchRequest,
    transport: &Transport,
) -> Result<Vec<FetchedRecord>, SearchError> {
    let scan_id = Uuid::new_v4();
    let span = info_span!("search_scan", %scan_id, kind = %request.kind);
    let metrics = transport.metrics().clone();

    let result = fetch_all(request, transport).instrument(span).await;
    match &result {
        Ok(records) => {
            metrics.records_fetched.inc_by(records.len() as u64);
            info!(
                "Search scan {} complete: {} records for {:?}",
                scan_id,
                records.len(),
                request.phrase
            );
        }
        Err(_) => {
            metrics.scans_failed.inc();
        }
    }
    result
}

async fn fetch_all(
    request: &SearchRequest,
    transport: &Transport,
) -> Result<Vec<FetchedRecord>, SearchError> {
    let strategy = PartitionStrategy::for_request(request);
    let cap = request.row_cap;
    let mut cursors = vec![Cursor::default(); strategy.cursor_count()];
    let mut records: Vec<FetchedRecord> = Vec::new();
    let mut current = 0usize;

    info!(
        "Starting {} search scan: mode={}, row_cap={}",
        request.kind,
        strategy.mode(),
        cap
    );

    while records.len() < cap {
        let Some(idx) = next_active(&cursors, current) else {
            break;
        };
        let start = cursors[idx].next_start;

        let url = match &strategy {
            PartitionStrategy::Combined { combine_sites } => {
                build_url(request, start, None, *combine_sites)?
            }
            PartitionStrategy::RoundRobin { partitions } => {
                build_url(request, start, Some(&partitions[idx]), false)?
            }
        };
        debug!(
            "Fetching page: mode={}, partition={}, start={}, url={}",
            strategy.mode(),
            idx,
            start,
            redact_url(&url)
        );

        let response = transport.fetch(&url).await?;
        let page = parse_page(request.kind, &response.body)?;
        let item_count = page.records.len();

        let room = cap - records.len();
        records.extend(page.records.into_iter().take(room));
        cursors[idx].advance(start, item_count, page.next_start);

        debug!(
            "Page returned {} items (total {}), next={:?}",
            item_count,
            records.len(),
            page.next_start
        );

        current = (idx + 1) % cursors.len();
    }

    Ok(records)
}
