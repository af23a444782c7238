//! Predicate absorption: moving caller predicates into the upstream query.
//!
//! Framework-independent. The DataFusion adapter in `table` and `rule`
//! converts plan expressions into [`Predicate`], [`LimitHint`] and
//! [`SortHint`] values before calling in here.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::request::{FilterSet, SearchKind, SearchRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOp {
    EqualTo(Literal),
    NotEqualTo(Literal),
    /// `LIKE 'value%'`
    Prefix(String),
    /// `LIKE '%value'`
    Suffix(String),
    InList(Vec<Literal>),
    LowerBound { value: Literal, inclusive: bool },
    UpperBound { value: Literal, inclusive: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: PredicateOp) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorption {
    /// Fully enforced upstream; the caller may drop it.
    Exact,
    /// Narrows the upstream query; the caller must still apply it.
    Approximate,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitHint {
    Constant(u64),
    Unset,
    Expression,
    Percentage,
    WithTies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortHint {
    pub column: String,
    pub descending: bool,
}

enum Effect {
    Include(Vec<String>),
    Exclude(String),
    DateFrom(DateTime<Utc>),
    DateTo(DateTime<Utc>),
}

const SITE_COLUMN: &str = "site";
const DATE_COLUMNS: [&str; 2] = ["timestamp", "date"];

fn effect_of(kind: SearchKind, predicate: &Predicate) -> Option<Effect> {
    if kind != SearchKind::Web {
        return None;
    }
    let column = predicate.column.as_str();

    if column == SITE_COLUMN {
        return match &predicate.op {
            PredicateOp::Suffix(pattern) | PredicateOp::Prefix(pattern) => {
                normalize_site(pattern).map(|s| Effect::Include(vec![s]))
            }
            PredicateOp::EqualTo(Literal::Text(site)) => {
                normalize_site(site).map(|s| Effect::Include(vec![s]))
            }
            PredicateOp::NotEqualTo(Literal::Text(site)) => normalize_site(site).map(Effect::Exclude),
            PredicateOp::InList(values) if !values.is_empty() => values
                .iter()
                .map(|v| match v {
                    Literal::Text(site) => normalize_site(site),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Effect::Include),
            _ => None,
        };
    }

    if DATE_COLUMNS.contains(&column) {
        return match &predicate.op {
            PredicateOp::LowerBound { value, .. } => literal_to_datetime(value).map(Effect::DateFrom),
            PredicateOp::UpperBound { value, .. } => literal_to_datetime(value).map(Effect::DateTo),
            _ => None,
        };
    }

    None
}

pub fn classify(kind: SearchKind, predicate: &Predicate) -> Absorption {
    match effect_of(kind, predicate) {
        Some(Effect::Include(_)) | Some(Effect::Exclude(_)) => Absorption::Exact,
        Some(Effect::DateFrom(_)) | Some(Effect::DateTo(_)) => Absorption::Approximate,
        None => Absorption::Unsupported,
    }
}

/// Apply every absorbable predicate to `filters`, returning the residual
/// predicates in their original order.
///
/// Date bounds are applied but kept in the residual list.
pub fn absorb_predicates(
    kind: SearchKind,
    predicates: Vec<Predicate>,
    filters: &mut FilterSet,
) -> Vec<Predicate> {
    let mut residual = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        match effect_of(kind, &predicate) {
            Some(Effect::Include(sites)) => filters.site_includes.extend(sites),
            Some(Effect::Exclude(site)) => filters.site_excludes.push(site),
            Some(Effect::DateFrom(at)) => {
                filters.date_from = Some(at);
                residual.push(predicate);
            }
            Some(Effect::DateTo(at)) => {
                filters.date_to = Some(at);
                residual.push(predicate);
            }
            None => residual.push(predicate),
        }
    }
    residual
}

/// Narrow the row cap from a limit directly above the scan.
///
/// `skip` rows are added so an OFFSET still sees enough results. Returns
/// `None` when the hint cannot be absorbed. The cap never grows.
pub fn absorb_limit(request: &SearchRequest, hint: &LimitHint, skip: u64) -> Option<SearchRequest> {
    match hint {
        LimitHint::Constant(n) => {
            let wanted = usize::try_from(n.saturating_add(skip)).unwrap_or(usize::MAX);
            Some(request.with_row_cap(wanted.min(request.row_cap)))
        }
        LimitHint::Unset => Some(request.clone()),
        LimitHint::Expression | LimitHint::Percentage | LimitHint::WithTies => None,
    }
}

pub fn sort_token(hint: &SortHint) -> Option<&'static str> {
    match (hint.column.as_str(), hint.descending) {
        ("date", true) => Some("date:d"),
        ("date", false) => Some("date:a"),
        _ => None,
    }
}

/// Map a single-column sort on `date` to the API sort token.
///
/// Returns `None` for image search, multi-column sorts, other columns, or
/// when a sort value was already supplied.
pub fn absorb_sort(request: &SearchRequest, hints: &[SortHint]) -> Option<SearchRequest> {
    if request.kind != SearchKind::Web {
        return None;
    }
    let [hint] = hints else {
        return None;
    };
    let token = sort_token(hint)?;
    if request.filters.sort.as_deref().is_some_and(|s| !s.is_empty()) {
        return None;
    }
    Some(request.with_sort(token))
}

fn normalize_site(raw: &str) -> Option<String> {
    let site = raw
        .trim()
        .trim_matches(|c| c == '%' || c == '*')
        .trim_matches('.')
        .to_string();
    if site.is_empty() || site.contains(['%', '_', '*', ' ']) {
        None
    } else {
        Some(site)
    }
}

fn literal_to_datetime(literal: &Literal) -> Option<DateTime<Utc>> {
    match literal {
        Literal::Timestamp(ts) => Some(*ts),
        Literal::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Literal::Text(s) => parse_datetime_text(s),
        Literal::Int(_) => None,
    }
}

pub(crate) fn parse_datetime_text(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
