//! Logical optimizer rule that pushes `LIMIT` and `ORDER BY date` into
//! search table scans.
//!
//! Only nodes directly above a search scan are considered; projections in
//! between are looked through, anything else (a filter, a join) stops the
//! search.

use std::sync::Arc;

use datafusion::common::tree_node::Transformed;
use datafusion::common::ScalarValue;
use datafusion::datasource::{provider_as_source, source_as_provider};
use datafusion::error::Result as DFResult;
use datafusion::logical_expr::expr::Alias;
use datafusion::logical_expr::{Limit, LogicalPlan, Projection, Sort};
use datafusion::optimizer::optimizer::ApplyOrder;
use datafusion::optimizer::{OptimizerConfig, OptimizerRule};
use datafusion::prelude::Expr;
use tracing::debug;

use crate::filter::{absorb_limit, absorb_sort, LimitHint, SortHint};
use crate::request::SearchRequest;
use crate::table::SearchTable;

#[derive(Debug, Default)]
pub struct SearchPushdownRule;

impl SearchPushdownRule {
    pub fn new() -> Self {
        Self
    }
}

impl OptimizerRule for SearchPushdownRule {
    fn name(&self) -> &str {
        "search_pushdown"
    }

    fn apply_order(&self) -> Option<ApplyOrder> {
        Some(ApplyOrder::TopDown)
    }

    fn supports_rewrite(&self) -> bool {
        true
    }

    fn rewrite(
        &self,
        plan: LogicalPlan,
        _config: &dyn OptimizerConfig,
    ) -> DFResult<Transformed<LogicalPlan>> {
        match &plan {
            LogicalPlan::Limit(limit) => {
                let Some(skip) = skip_rows(limit) else {
                    return Ok(Transformed::no(plan));
                };
                let hint = limit_hint(limit);
                let rewritten = replace_search_scan(&limit.input, &|req: &SearchRequest| {
                    absorb_limit(req, &hint, skip)
                })?;
                match rewritten {
                    Some(input) => {
                        debug!("Pushed {:?} (skip {}) into search scan", hint, skip);
                        Ok(Transformed::yes(LogicalPlan::Limit(Limit {
                            skip: limit.skip.clone(),
                            fetch: limit.fetch.clone(),
                            input: Arc::new(input),
                        })))
                    }
                    None => Ok(Transformed::no(plan)),
                }
            }
            LogicalPlan::Sort(sort) => {
                let Some(hints) = sort_hints(sort) else {
                    return Ok(Transformed::no(plan));
                };
                match push_sort(&sort.input, &hints)? {
                    Some(input) => {
                        debug!("Pushed ORDER BY {:?} into search scan", hints);
                        Ok(Transformed::yes(LogicalPlan::Sort(Sort {
                            expr: sort.expr.clone(),
                            input: Arc::new(input),
                            fetch: sort.fetch,
                        })))
                    }
                    None => Ok(Transformed::no(plan)),
                }
            }
            _ => Ok(Transformed::no(plan)),
        }
    }
}

/// Find a search scan under `plan` (through projections) and swap its
/// request for `absorb(request)`. Returns `None` when nothing changed.
fn replace_search_scan(
    plan: &LogicalPlan,
    absorb: &dyn Fn(&SearchRequest) -> Option<SearchRequest>,
) -> DFResult<Option<LogicalPlan>> {
    match plan {
        LogicalPlan::Projection(projection) => {
            let Some(input) = replace_search_scan(&projection.input, absorb)? else {
                return Ok(None);
            };
            rebuild_projection(projection, input).map(Some)
        }
        LogicalPlan::TableScan(scan) => {
            let Ok(provider) = source_as_provider(&scan.source) else {
                return Ok(None);
            };
            let Some(table) = provider.as_any().downcast_ref::<SearchTable>() else {
                return Ok(None);
            };
            let current = table.request();
            let Some(next) = absorb(current) else {
                return Ok(None);
            };
            if next.row_cap == current.row_cap && next.filters.sort == current.filters.sort {
                return Ok(None);
            }

            let mut scan = scan.clone();
            scan.source = provider_as_source(Arc::new(table.with_request(next)));
            Ok(Some(LogicalPlan::TableScan(scan)))
        }
        _ => Ok(None),
    }
}

/// Sort hints name output columns; each projection they pass through
/// renames them back to its input's columns. A hinted column computed by
/// the projection blocks the pushdown.
fn push_sort(plan: &LogicalPlan, hints: &[SortHint]) -> DFResult<Option<LogicalPlan>> {
    match plan {
        LogicalPlan::Projection(projection) => {
            let Some(renamed) = hints
                .iter()
                .map(|hint| input_column(projection, hint))
                .collect::<Option<Vec<_>>>()
            else {
                return Ok(None);
            };
            let Some(input) = push_sort(&projection.input, &renamed)? else {
                return Ok(None);
            };
            rebuild_projection(projection, input).map(Some)
        }
        _ => replace_search_scan(plan, &|req: &SearchRequest| absorb_sort(req, hints)),
    }
}

fn input_column(projection: &Projection, hint: &SortHint) -> Option<SortHint> {
    let index = projection
        .schema
        .fields()
        .iter()
        .position(|f| f.name() == &hint.column)?;
    let source = match projection.expr.get(index)? {
        Expr::Column(col) => col,
        Expr::Alias(Alias { expr, .. }) => match expr.as_ref() {
            Expr::Column(col) => col,
            _ => return None,
        },
        _ => return None,
    };
    Some(SortHint {
        column: source.name.clone(),
        descending: hint.descending,
    })
}

fn rebuild_projection(projection: &Projection, input: LogicalPlan) -> DFResult<LogicalPlan> {
    let rebuilt = Projection::try_new_with_schema(
        projection.expr.clone(),
        Arc::new(input),
        Arc::clone(&projection.schema),
    )?;
    Ok(LogicalPlan::Projection(rebuilt))
}

fn literal_rows(expr: &Expr) -> Option<Option<u64>> {
    match expr {
        Expr::Literal(ScalarValue::Int64(Some(n))) => u64::try_from(*n).ok().map(Some),
        Expr::Literal(ScalarValue::UInt64(Some(n))) => Some(Some(*n)),
        Expr::Literal(ScalarValue::Int64(None)) | Expr::Literal(ScalarValue::UInt64(None)) => {
            Some(None)
        }
        Expr::Literal(ScalarValue::Null) => Some(None),
        _ => None,
    }
}

fn limit_hint(limit: &Limit) -> LimitHint {
    match limit.fetch.as_deref() {
        None => LimitHint::Unset,
        Some(expr) => match literal_rows(expr) {
            Some(Some(n)) => LimitHint::Constant(n),
            Some(None) => LimitHint::Unset,
            None => LimitHint::Expression,
        },
    }
}

/// Rows skipped by OFFSET; `None` when the offset is not a constant.
fn skip_rows(limit: &Limit) -> Option<u64> {
    match limit.skip.as_deref() {
        None => Some(0),
        Some(expr) => literal_rows(expr).map(|n| n.unwrap_or(0)),
    }
}

fn sort_hints(sort: &Sort) -> Option<Vec<SortHint>> {
    sort.expr
        .iter()
        .map(|s| match &s.expr {
            Expr::Column(col) => Some(SortHint {
                column: col.name.clone(),
                descending: !s.asc,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(skip: Option<Expr>, fetch: Option<Expr>) -> Limit {
        Limit {
            skip: skip.map(Box::new),
            fetch: fetch.map(Box::new),
            input: Arc::new(LogicalPlan::EmptyRelation(
                datafusion::logical_expr::EmptyRelation {
                    produce_one_row: false,
                    schema: Arc::new(datafusion::common::DFSchema::empty()),
                },
            )),
        }
    }

    fn int(n: i64) -> Expr {
        Expr::Literal(ScalarValue::Int64(Some(n)))
    }

    #[test]
    fn test_limit_hint_kinds() {
        assert_eq!(limit_hint(&limit(None, Some(int(15)))), LimitHint::Constant(15));
        assert_eq!(limit_hint(&limit(None, None)), LimitHint::Unset);
        assert_eq!(
            limit_hint(&limit(None, Some(Expr::Literal(ScalarValue::Int64(None))))),
            LimitHint::Unset
        );
        let computed = datafusion::logical_expr::lit(5i64) + datafusion::logical_expr::lit(5i64);
        assert_eq!(limit_hint(&limit(None, Some(computed))), LimitHint::Expression);
    }

    #[test]
    fn test_skip_rows() {
        assert_eq!(skip_rows(&limit(None, Some(int(10)))), Some(0));
        assert_eq!(skip_rows(&limit(Some(int(5)), Some(int(10)))), Some(5));
        let computed = datafusion::logical_expr::col("x");
        assert_eq!(skip_rows(&limit(Some(computed), Some(int(10)))), None);
    }

    fn projection(exprs: Vec<Expr>) -> Projection {
        use datafusion::arrow::datatypes::{DataType, Field, Schema};
        use datafusion::logical_expr::table_scan;

        let schema = Schema::new(vec![
            Field::new("title", DataType::Utf8, true),
            Field::new("date", DataType::Utf8, true),
        ]);
        let input = table_scan(Some("t"), &schema, None)
            .unwrap()
            .build()
            .unwrap();
        Projection::try_new(exprs, Arc::new(input)).unwrap()
    }

    fn hint(column: &str) -> SortHint {
        SortHint {
            column: column.to_string(),
            descending: true,
        }
    }

    #[test]
    fn test_input_column_follows_aliases() {
        use datafusion::logical_expr::{col, lit};

        let renamed = projection(vec![col("title").alias("date"), col("date").alias("published")]);
        assert_eq!(input_column(&renamed, &hint("date")), Some(hint("title")));
        assert_eq!(input_column(&renamed, &hint("published")), Some(hint("date")));
        assert_eq!(input_column(&renamed, &hint("title")), None);

        let computed = projection(vec![(col("title").eq(lit("x"))).alias("date")]);
        assert_eq!(input_column(&computed, &hint("date")), None);

        let plain = projection(vec![col("date")]);
        assert_eq!(input_column(&plain, &hint("date")), Some(hint("date")));
    }
}
