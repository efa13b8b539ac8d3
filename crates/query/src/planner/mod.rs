//! Query planner module.

mod builder;
mod logical;
mod physical;

pub use builder::LogicalPlanBuilder;
pub use logical::{LogicalPlan, SchemaScan, TableScan};
pub use physical::{build, PhysicalPlan};
