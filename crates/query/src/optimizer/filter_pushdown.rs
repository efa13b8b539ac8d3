//! Filter pushdown optimization pass.
//!
//! Moves filter predicates into the table scan so they are evaluated while
//! reading, where row-group statistics can skip data before it is decoded.
//!
//! Predicates are split into their AND-ed terms and each term travels down
//! on its own:
//! 1. Through Projection and Distinct when every column it reads is passed
//!    through unchanged by that operator
//! 2. Through Aggregate only when it reads nothing but group-by columns
//! 3. Into the TableScan filter, where the Filter node disappears
//!
//! Terms that cannot move stay as a Filter directly above the operator that
//! stopped them. Predicates on aggregate results therefore stay above the
//! Aggregate.

use crate::ast::{ColumnMatcher, Expr};
use crate::optimizer::OptimizerPass;
use crate::planner::LogicalPlan;

/// Filter pushdown optimization.
pub struct FilterPushDown;

impl OptimizerPass for FilterPushDown {
    fn optimize(&self, plan: LogicalPlan) -> LogicalPlan {
        self.pushdown(plan, Vec::new())
    }

    fn name(&self) -> &'static str {
        "filter_pushdown"
    }
}

impl FilterPushDown {
    /// Pushes `pending` predicates, outermost first, into `plan`.
    fn pushdown(&self, plan: LogicalPlan, mut pending: Vec<Expr>) -> LogicalPlan {
        match plan {
            LogicalPlan::Filter { input, predicate } => {
                pending.extend(predicate.split_conjunction().into_iter().cloned());
                self.pushdown(*input, pending)
            }

            LogicalPlan::TableScan(mut scan) => {
                if !pending.is_empty() {
                    scan.filter = Expr::conjunction(scan.filter.take().into_iter().chain(pending));
                }
                LogicalPlan::TableScan(scan)
            }

            LogicalPlan::SchemaScan(_) => wrap(plan, pending),

            LogicalPlan::Projection { input, exprs } => {
                let (pushed, kept) = partition(pending, &exprs);
                let plan = LogicalPlan::projection(self.pushdown(*input, pushed), exprs);
                wrap(plan, kept)
            }

            LogicalPlan::Distinct { input, columns } => {
                let (pushed, kept) = partition(pending, &columns);
                let plan = LogicalPlan::distinct(self.pushdown(*input, pushed), columns);
                wrap(plan, kept)
            }

            LogicalPlan::Aggregate {
                input,
                aggregate,
                group_by,
            } => {
                // A global aggregate emits one row even for empty input.
                let (pushed, kept) = if group_by.is_empty() {
                    (Vec::new(), pending)
                } else {
                    partition(pending, &group_by)
                };
                let plan =
                    LogicalPlan::aggregate(self.pushdown(*input, pushed), aggregate, group_by);
                wrap(plan, kept)
            }
        }
    }
}

/// Splits predicates into those `outputs` passes through and the rest.
fn partition(pending: Vec<Expr>, outputs: &[Expr]) -> (Vec<Expr>, Vec<Expr>) {
    pending
        .into_iter()
        .partition(|predicate| passes_through(predicate, outputs))
}

/// Returns true if every column `predicate` reads is an input column that
/// `outputs` forwards unchanged.
fn passes_through(predicate: &Expr, outputs: &[Expr]) -> bool {
    predicate.columns_used().iter().all(|used| {
        outputs.iter().any(|output| match (used, output) {
            (ColumnMatcher::Static(name), Expr::Column(column)) => name == column,
            (ColumnMatcher::Static(name), Expr::DynamicColumn(group)) => {
                ColumnMatcher::DynamicGroup(group.clone()).matches(name)
            }
            (ColumnMatcher::DynamicGroup(used), Expr::DynamicColumn(group)) => used == group,
            _ => false,
        })
    })
}

/// Re-creates a single Filter over `plan` for predicates that stayed.
fn wrap(plan: LogicalPlan, kept: Vec<Expr>) -> LogicalPlan {
    match Expr::conjunction(kept) {
        Some(predicate) => LogicalPlan::filter(plan, predicate),
        None => plan,
    }
}
