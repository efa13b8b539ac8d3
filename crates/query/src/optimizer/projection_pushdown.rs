//! Projection pushdown optimization pass.
//!
//! Computes, top-down, the columns every operator needs from its input and
//! records the set required at the bottom in the table scan, so only those
//! columns are decoded from storage.
//!
//! - Projection, Aggregate and Distinct replace the requirement with the
//!   columns their own expressions read.
//! - Filter adds the columns of its predicate.
//! - A plan with no such operator above the scan reads every column.

use crate::ast::ColumnMatcher;
use crate::optimizer::OptimizerPass;
use crate::planner::LogicalPlan;

/// Projection pushdown optimization.
pub struct ProjectionPushDown;

impl OptimizerPass for ProjectionPushDown {
    fn optimize(&self, plan: LogicalPlan) -> LogicalPlan {
        self.pushdown(plan, None)
    }

    fn name(&self) -> &'static str {
        "projection_pushdown"
    }
}

impl ProjectionPushDown {
    fn pushdown(&self, plan: LogicalPlan, required: Option<Vec<ColumnMatcher>>) -> LogicalPlan {
        match plan {
            LogicalPlan::TableScan(mut scan) => {
                scan.projection = required.map(|mut columns| {
                    // Whatever was already pushed into the scan is read too.
                    for expr in scan.filter.iter().chain(scan.distinct.iter()) {
                        extend(&mut columns, expr.columns_used());
                    }
                    columns
                });
                LogicalPlan::TableScan(scan)
            }

            LogicalPlan::SchemaScan(_) => plan,

            LogicalPlan::Filter { input, predicate } => {
                let required = required.map(|mut columns| {
                    extend(&mut columns, predicate.columns_used());
                    columns
                });
                LogicalPlan::filter(self.pushdown(*input, required), predicate)
            }

            LogicalPlan::Aggregate {
                input,
                aggregate,
                group_by,
            } => {
                let mut columns = Vec::new();
                for expr in &group_by {
                    extend(&mut columns, expr.columns_used());
                }
                extend(&mut columns, aggregate.columns_used());
                LogicalPlan::aggregate(self.pushdown(*input, Some(columns)), aggregate, group_by)
            }

            LogicalPlan::Distinct { input, columns } => {
                let mut required = Vec::new();
                for expr in &columns {
                    extend(&mut required, expr.columns_used());
                }
                LogicalPlan::distinct(self.pushdown(*input, Some(required)), columns)
            }

            LogicalPlan::Projection { input, exprs } => {
                let mut required = Vec::new();
                for expr in &exprs {
                    extend(&mut required, expr.columns_used());
                }
                LogicalPlan::projection(self.pushdown(*input, Some(required)), exprs)
            }
        }
    }
}

fn extend(columns: &mut Vec<ColumnMatcher>, more: Vec<ColumnMatcher>) {
    for column in more {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
}
