//! Optimizer pass trait.

use crate::planner::LogicalPlan;

/// An optimization pass that rewrites a logical plan.
///
/// A pass owns the tree while it runs, so passes are applied one after the
/// other and never share nodes. Running a pass on its own output must
/// return that output unchanged.
pub trait OptimizerPass {
    /// Optimizes the given logical plan.
    fn optimize(&self, plan: LogicalPlan) -> LogicalPlan;

    /// Returns the name of this pass.
    fn name(&self) -> &'static str {
        "unnamed"
    }
}
