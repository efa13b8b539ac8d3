//! Fluent construction of logical plans.

use crate::ast::Expr;
use crate::config::ScanOptions;
use crate::planner::logical::{LogicalPlan, SchemaScan, TableScan};
use crate::provider::TableProvider;

/// Builds a [`LogicalPlan`] one operator at a time.
///
/// Every method returns a new builder whose plan wraps the previous one, so
/// a builder can be branched into several queries without interference.
/// Shape checks (aggregate and group-by expressions, column resolution) are
/// deferred to physical planning.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
}

impl LogicalPlanBuilder {
    /// Starts from an existing plan.
    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self { plan }
    }

    /// Starts with a scan of `table` resolved through `provider`.
    pub fn scan(provider: &dyn TableProvider, table: impl Into<String>) -> Self {
        Self::scan_with_options(provider, table, ScanOptions::default())
    }

    /// Starts with a scan of `table` using `options`.
    pub fn scan_with_options(
        provider: &dyn TableProvider,
        table: impl Into<String>,
        options: ScanOptions,
    ) -> Self {
        let table = table.into();
        let reader = provider.get_table(&table);
        Self::from_plan(LogicalPlan::table_scan(TableScan::new(table, reader, options)))
    }

    /// Starts with a scan of the realized column names of `table`.
    pub fn scan_schema(provider: &dyn TableProvider, table: impl Into<String>) -> Self {
        Self::scan_schema_with_options(provider, table, ScanOptions::default())
    }

    pub fn scan_schema_with_options(
        provider: &dyn TableProvider,
        table: impl Into<String>,
        options: ScanOptions,
    ) -> Self {
        let table = table.into();
        let reader = provider.get_table(&table);
        Self::from_plan(LogicalPlan::schema_scan(SchemaScan::new(table, reader, options)))
    }

    /// Keeps rows for which `predicate` is true.
    pub fn filter(&self, predicate: Expr) -> Self {
        Self::from_plan(LogicalPlan::filter(self.plan.clone(), predicate))
    }

    /// Aggregates `aggregate` over the groups formed by `group_by`.
    pub fn aggregate(&self, aggregate: Expr, group_by: Vec<Expr>) -> Self {
        Self::from_plan(LogicalPlan::aggregate(self.plan.clone(), aggregate, group_by))
    }

    /// Keeps the first row of every distinct combination of `columns`.
    pub fn distinct(&self, columns: Vec<Expr>) -> Self {
        Self::from_plan(LogicalPlan::distinct(self.plan.clone(), columns))
    }

    /// Produces `exprs` as output columns.
    pub fn project(&self, exprs: Vec<Expr>) -> Self {
        Self::from_plan(LogicalPlan::projection(self.plan.clone(), exprs))
    }

    /// Returns the plan built so far.
    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Finishes the plan.
    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}
