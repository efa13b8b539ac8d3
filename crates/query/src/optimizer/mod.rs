//! Query optimizer module.

mod distinct_pushdown;
mod filter_pushdown;
mod pass;
mod projection_pushdown;

pub use distinct_pushdown::DistinctPushDown;
pub use filter_pushdown::FilterPushDown;
pub use pass::OptimizerPass;
pub use projection_pushdown::ProjectionPushDown;

use crate::planner::LogicalPlan;
use tracing::debug;

/// Query optimizer that applies optimization passes.
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizerPass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// Creates a new optimizer with the default passes.
    ///
    /// The default passes are applied in this order:
    /// 1. ProjectionPushDown - Record the columns to read in the scan
    /// 2. FilterPushDown - Move predicates into the scan filter
    /// 3. DistinctPushDown - Let the scan drop duplicates early
    ///
    /// Each pass takes the tree produced by the previous one; the order is
    /// fixed and the passes are never run concurrently on one tree.
    pub fn new() -> Self {
        Self {
            passes: vec![
                Box::new(ProjectionPushDown),
                Box::new(FilterPushDown),
                Box::new(DistinctPushDown),
            ],
        }
    }

    /// Creates an optimizer with custom passes.
    pub fn with_passes(passes: Vec<Box<dyn OptimizerPass>>) -> Self {
        Self { passes }
    }

    /// Returns the pass names in application order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Optimizes a logical plan.
    pub fn optimize(&self, mut plan: LogicalPlan) -> LogicalPlan {
        for pass in &self.passes {
            plan = pass.optimize(plan);
            debug!(pass = pass.name(), "applied optimizer pass");
        }
        plan
    }
}
