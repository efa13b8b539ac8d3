//! Distinct pushdown optimization pass.
//!
//! Lets the table scan drop duplicate rows early. A Distinct hands its
//! columns to the scan when the path down to it only crosses Projections
//! that produce each distinct column verbatim. Filter, Aggregate and nested
//! Distinct nodes stop the push; an Aggregate changes cardinality, so a
//! requirement is never moved past one.
//!
//! The Distinct node itself stays in place: the scan only de-duplicates
//! within a batch, the operator still de-duplicates globally.

use crate::ast::Expr;
use crate::optimizer::OptimizerPass;
use crate::planner::LogicalPlan;

/// Distinct pushdown optimization.
pub struct DistinctPushDown;

impl OptimizerPass for DistinctPushDown {
    fn optimize(&self, mut plan: LogicalPlan) -> LogicalPlan {
        self.pushdown(&mut plan);
        plan
    }

    fn name(&self) -> &'static str {
        "distinct_pushdown"
    }
}

impl DistinctPushDown {
    fn pushdown(&self, plan: &mut LogicalPlan) {
        match plan {
            LogicalPlan::Distinct { input, columns } => {
                self.pushdown(input);
                push_into_scan(input, columns);
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Projection { input, .. } => self.pushdown(input),
            LogicalPlan::TableScan(_) | LogicalPlan::SchemaScan(_) => {}
        }
    }
}

/// Walks down from a Distinct's input and records `columns` on the scan if
/// it is reachable. Returns true if the scan was reached.
fn push_into_scan(plan: &mut LogicalPlan, columns: &[Expr]) -> bool {
    match plan {
        LogicalPlan::TableScan(scan) => {
            scan.distinct = columns.to_vec();
            true
        }
        LogicalPlan::Projection { input, exprs } => {
            if columns.iter().all(|c| exprs.contains(c)) {
                push_into_scan(input, columns)
            } else {
                false
            }
        }
        LogicalPlan::Filter { .. }
        | LogicalPlan::Aggregate { .. }
        | LogicalPlan::Distinct { .. }
        | LogicalPlan::SchemaScan(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, dyn_col, lit, sum};
    use crate::config::ScanOptions;
    use crate::planner::TableScan;

    fn scan() -> LogicalPlan {
        LogicalPlan::table_scan(TableScan::new("t", None, ScanOptions::default()))
    }

    fn scan_distinct(plan: &LogicalPlan) -> Vec<Expr> {
        plan.table_scan_node()
            .map(|s| s.distinct.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_push_through_projection() {
        let plan = LogicalPlan::distinct(
            LogicalPlan::projection(scan(), vec![col("a"), col("b"), dyn_col("labels")]),
            vec![col("a"), dyn_col("labels")],
        );
        let optimized = DistinctPushDown.optimize(plan);
        assert!(matches!(optimized, LogicalPlan::Distinct { .. }));
        assert_eq!(scan_distinct(&optimized), vec![col("a"), dyn_col("labels")]);
    }

    #[test]
    fn test_never_past_aggregate() {
        let plan = LogicalPlan::distinct(
            LogicalPlan::aggregate(scan(), sum(col("value")).alias("s"), vec![col("a")]),
            vec![col("a")],
        );
        let optimized = DistinctPushDown.optimize(plan);
        assert!(scan_distinct(&optimized).is_empty());
    }

    #[test]
    fn test_stops_at_filter_and_alias() {
        let filtered = LogicalPlan::distinct(
            LogicalPlan::filter(scan(), col("a").gt(lit(1i64))),
            vec![col("a")],
        );
        assert!(scan_distinct(&DistinctPushDown.optimize(filtered)).is_empty());

        let aliased = LogicalPlan::distinct(
            LogicalPlan::projection(scan(), vec![col("x").alias("a")]),
            vec![col("a")],
        );
        assert!(scan_distinct(&DistinctPushDown.optimize(aliased)).is_empty());
    }

    #[test]
    fn test_directly_over_scan() {
        let plan = LogicalPlan::distinct(scan(), vec![col("name")]);
        let optimized = DistinctPushDown.optimize(plan);
        assert_eq!(scan_distinct(&optimized), vec![col("name")]);
    }

    #[test]
    fn test_idempotent() {
        let plan = LogicalPlan::projection(
            LogicalPlan::distinct(scan(), vec![col("a")]),
            vec![col("a")],
        );
        let once = DistinctPushDown.optimize(plan);
        let twice = DistinctPushDown.optimize(once.clone());
        assert_eq!(once, twice);
    }
}
