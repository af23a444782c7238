//! Search results as a DataFusion `TableProvider`
//!
//! `SearchTable` answers the engine's filter-pushdown questions with the
//! absorber's classification and, at scan time, converts pushed `Expr`s into
//! framework-independent predicates before building a [`SearchScanExec`].

use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use datafusion::catalog::Session;
use datafusion::common::ScalarValue;
use datafusion::datasource::TableProvider;
use datafusion::error::Result as DFResult;
use datafusion::logical_expr::expr::{InList, Like};
use datafusion::logical_expr::{BinaryExpr, Operator, TableProviderFilterPushDown, TableType};
use datafusion::physical_plan::ExecutionPlan;
use datafusion::prelude::Expr;
use tracing::debug;

use crate::exec::SearchScanExec;
use crate::filter::{absorb_predicates, classify, Absorption, Literal, Predicate, PredicateOp};
use crate::request::{SearchKind, SearchRequest};
use crate::sink::schema_for;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct SearchTable {
    request: SearchRequest,
    transport: Transport,
    schema: SchemaRef,
}

impl SearchTable {
    pub fn new(request: SearchRequest, transport: Transport) -> Self {
        let schema = schema_for(request.kind);
        Self {
            request,
            transport,
            schema,
        }
    }

    pub fn kind(&self) -> SearchKind {
        self.request.kind
    }

    /// The request as bound, before any scan-time predicate absorption.
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Same table, different request. Used by the pushdown rule.
    pub fn with_request(&self, request: SearchRequest) -> Self {
        Self {
            request,
            transport: self.transport.clone(),
            schema: Arc::clone(&self.schema),
        }
    }
}

#[async_trait]
impl TableProvider for SearchTable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn table_type(&self) -> TableType {
        TableType::Temporary
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DFResult<Vec<TableProviderFilterPushDown>> {
        Ok(filters
            .iter()
            .map(|expr| match expr_to_predicate(expr) {
                Some(p) => match classify(self.kind(), &p) {
                    Absorption::Exact => TableProviderFilterPushDown::Exact,
                    Absorption::Approximate => TableProviderFilterPushDown::Inexact,
                    Absorption::Unsupported => TableProviderFilterPushDown::Unsupported,
                },
                None => TableProviderFilterPushDown::Unsupported,
            })
            .collect())
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        let mut request = self.request.clone();

        let predicates: Vec<Predicate> = filters.iter().filter_map(expr_to_predicate).collect();
        let residual = absorb_predicates(request.kind, predicates, &mut request.filters);
        debug!(
            "Absorbed {} of {} pushed filters; {} left for the engine",
            filters.len() - residual.len(),
            filters.len(),
            residual.len()
        );

        if let Some(limit) = limit {
            request = request.with_row_cap(limit.min(request.row_cap));
        }

        let exec = SearchScanExec::try_new(request, self.transport.clone(), projection.cloned())?;
        Ok(Arc::new(exec))
    }
}

// ===========================================================================
// Expr -> Predicate
// ===========================================================================

/// Convert a DataFusion filter into a [`Predicate`], if it has a shape the
/// absorber understands.
pub fn expr_to_predicate(expr: &Expr) -> Option<Predicate> {
    match expr {
        Expr::BinaryExpr(BinaryExpr {
            op: Operator::Or, ..
        }) => {
            let mut leaves = Vec::new();
            collect_equalities(expr, &mut leaves)?;
            let (column, _) = leaves.first()?;
            let column = column.clone();
            if leaves.iter().any(|(c, _)| *c != column) {
                return None;
            }
            let values = leaves.into_iter().map(|(_, v)| v).collect();
            Some(Predicate::new(column, PredicateOp::InList(values)))
        }
        Expr::BinaryExpr(BinaryExpr { left, op, right }) => {
            if let (Some(column), Some(value)) = (column_name(left), literal(right)) {
                comparison(column, *op, value)
            } else if let (Some(value), Some(column)) = (literal(left), column_name(right)) {
                comparison(column, op.swap()?, value)
            } else {
                None
            }
        }
        Expr::Like(Like {
            negated: false,
            expr,
            pattern,
            escape_char: None,
            case_insensitive: false,
        }) => {
            let column = column_name(expr)?;
            let Some(Literal::Text(pattern)) = literal(pattern) else {
                return None;
            };
            like_pattern(&pattern).map(|op| Predicate::new(column, op))
        }
        Expr::InList(InList {
            expr,
            list,
            negated: false,
        }) => {
            let column = column_name(expr)?;
            let values = list.iter().map(literal).collect::<Option<Vec<_>>>()?;
            Some(Predicate::new(column, PredicateOp::InList(values)))
        }
        _ => None,
    }
}

/// Leaves of an `OR` chain, each of which must be `column = literal`.
/// Small `IN` lists reach providers in this form.
fn collect_equalities(expr: &Expr, leaves: &mut Vec<(String, Literal)>) -> Option<()> {
    let Expr::BinaryExpr(BinaryExpr { left, op, right }) = expr else {
        return None;
    };
    match op {
        Operator::Or => {
            collect_equalities(left, leaves)?;
            collect_equalities(right, leaves)
        }
        Operator::Eq => {
            let leaf = match (column_name(left), literal(right)) {
                (Some(column), Some(value)) => (column, value),
                _ => (column_name(right)?, literal(left)?),
            };
            leaves.push(leaf);
            Some(())
        }
        _ => None,
    }
}

fn comparison(column: String, op: Operator, value: Literal) -> Option<Predicate> {
    let op = match op {
        Operator::Eq => PredicateOp::EqualTo(value),
        Operator::NotEq => PredicateOp::NotEqualTo(value),
        Operator::Gt => PredicateOp::LowerBound {
            value,
            inclusive: false,
        },
        Operator::GtEq => PredicateOp::LowerBound {
            value,
            inclusive: true,
        },
        Operator::Lt => PredicateOp::UpperBound {
            value,
            inclusive: false,
        },
        Operator::LtEq => PredicateOp::UpperBound {
            value,
            inclusive: true,
        },
        _ => return None,
    };
    Some(Predicate::new(column, op))
}

fn like_pattern(pattern: &str) -> Option<PredicateOp> {
    let is_plain = |s: &str| !s.is_empty() && !s.contains(['%', '_']);
    if let Some(rest) = pattern.strip_prefix('%') {
        if is_plain(rest) {
            return Some(PredicateOp::Suffix(rest.to_string()));
        }
    }
    if let Some(rest) = pattern.strip_suffix('%') {
        if is_plain(rest) {
            return Some(PredicateOp::Prefix(rest.to_string()));
        }
    }
    None
}

/// Column name, looking through casts the type coercer adds.
fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Column(col) => Some(col.name.clone()),
        Expr::Cast(cast) => column_name(&cast.expr),
        Expr::TryCast(cast) => column_name(&cast.expr),
        _ => None,
    }
}

fn literal(expr: &Expr) -> Option<Literal> {
    let Expr::Literal(value) = expr else {
        return None;
    };
    match value {
        ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) | ScalarValue::Utf8View(Some(s)) => {
            Some(Literal::Text(s.clone()))
        }
        ScalarValue::Int8(Some(v)) => Some(Literal::Int(i64::from(*v))),
        ScalarValue::Int16(Some(v)) => Some(Literal::Int(i64::from(*v))),
        ScalarValue::Int32(Some(v)) => Some(Literal::Int(i64::from(*v))),
        ScalarValue::Int64(Some(v)) => Some(Literal::Int(*v)),
        ScalarValue::Date32(Some(days)) => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
            epoch
                .checked_add_signed(chrono::Duration::days(i64::from(*days)))
                .map(Literal::Date)
        }
        ScalarValue::TimestampSecond(Some(v), _) => timestamp(*v, 1_000_000_000),
        ScalarValue::TimestampMillisecond(Some(v), _) => timestamp(*v, 1_000_000),
        ScalarValue::TimestampMicrosecond(Some(v), _) => timestamp(*v, 1_000),
        ScalarValue::TimestampNanosecond(Some(v), _) => timestamp(*v, 1),
        _ => None,
    }
}

/// `value` in units of `nanos_per_unit` nanoseconds since the epoch.
fn timestamp(value: i64, nanos_per_unit: i64) -> Option<Literal> {
    let units_per_sec = 1_000_000_000 / nanos_per_unit;
    let secs = value.div_euclid(units_per_sec);
    let nanos = value.rem_euclid(units_per_sec) * nanos_per_unit;
    DateTime::<Utc>::from_timestamp(secs, u32::try_from(nanos).ok()?).map(Literal::Timestamp)
}
