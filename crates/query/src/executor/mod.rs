//! Query executor module.
//!
//! Operators are pulled one batch at a time from the root of a
//! [`PhysicalPlan`](crate::planner::PhysicalPlan).

mod aggregate;
mod distinct;
mod expr;
mod filter;
mod operator;
mod project;
mod pruning;
mod scan;
mod schema_scan;

pub use aggregate::HashAggregateExec;
pub use distinct::DistinctExec;
pub use expr::{ColumnarValue, PhysicalExpr};
pub use filter::FilterExec;
pub use operator::Operator;
pub use project::ProjectionExec;
pub use pruning::can_skip;
pub use scan::{ScanMetrics, TableScanExec};
pub use schema_scan::{SchemaScanExec, SCHEMA_SCAN_COLUMN};
