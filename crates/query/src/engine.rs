//! Query engine entry point.
//!
//! The engine ties the pieces together: it starts plans from its table
//! provider, runs the optimizer, compiles the result against the scanned
//! table's schema and drives execution into a caller-supplied callback.

use crate::ast::Expr;
use crate::config::EngineConfig;
use crate::optimizer::Optimizer;
use crate::planner::{self, LogicalPlan, LogicalPlanBuilder, PhysicalPlan};
use crate::provider::TableProvider;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use strata_core::{Allocator, Error, Result};
use tracing::debug;

/// Query engine over a table provider.
#[derive(Clone)]
pub struct Engine {
    allocator: Arc<dyn Allocator>,
    provider: Arc<dyn TableProvider>,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(allocator: Arc<dyn Allocator>, provider: Arc<dyn TableProvider>) -> Self {
        Self {
            allocator,
            provider,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Starts a query over the rows of `table`.
    pub fn scan_table(&self, table: impl Into<String>) -> QueryBuilder {
        let builder =
            LogicalPlanBuilder::scan_with_options(self.provider.as_ref(), table, self.config.scan);
        QueryBuilder {
            engine: self.clone(),
            builder,
        }
    }

    /// Starts a query over the realized column names of `table`.
    pub fn scan_schema(&self, table: impl Into<String>) -> QueryBuilder {
        let builder = LogicalPlanBuilder::scan_schema_with_options(
            self.provider.as_ref(),
            table,
            self.config.scan,
        );
        QueryBuilder {
            engine: self.clone(),
            builder,
        }
    }

    fn optimize(&self, plan: LogicalPlan) -> LogicalPlan {
        if self.config.optimize {
            Optimizer::new().optimize(plan)
        } else {
            plan
        }
    }

    fn compile(&self, plan: &LogicalPlan) -> Result<PhysicalPlan> {
        let table = plan
            .table()
            .ok_or_else(|| Error::table_not_found(plan.table_name()))?;
        planner::build(&self.allocator, table.schema(), plan)
    }
}

/// The stages of a query plan, rendered as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplainResult {
    pub logical_plan: String,
    pub optimized_plan: String,
    pub physical_plan: String,
}

/// A query under construction.
///
/// Like [`LogicalPlanBuilder`], every method returns a new query and leaves
/// `self` untouched.
#[derive(Clone)]
pub struct QueryBuilder {
    engine: Engine,
    builder: LogicalPlanBuilder,
}

impl QueryBuilder {
    pub fn filter(&self, predicate: Expr) -> Self {
        self.with_builder(self.builder.filter(predicate))
    }

    pub fn aggregate(&self, aggregate: Expr, group_by: Vec<Expr>) -> Self {
        self.with_builder(self.builder.aggregate(aggregate, group_by))
    }

    pub fn distinct(&self, columns: Vec<Expr>) -> Self {
        self.with_builder(self.builder.distinct(columns))
    }

    pub fn project(&self, exprs: Vec<Expr>) -> Self {
        self.with_builder(self.builder.project(exprs))
    }

    fn with_builder(&self, builder: LogicalPlanBuilder) -> Self {
        Self {
            engine: self.engine.clone(),
            builder,
        }
    }

    /// Returns the unoptimized logical plan.
    pub fn plan(&self) -> &LogicalPlan {
        self.builder.plan()
    }

    /// Renders the logical, optimized and physical plans.
    pub fn explain(&self) -> Result<ExplainResult> {
        let logical = self.builder.plan().clone();
        let logical_plan = logical.to_string();
        let optimized = self.engine.optimize(logical);
        let optimized_plan = optimized.to_string();
        let physical_plan = self.engine.compile(&optimized)?.display_indent();
        Ok(ExplainResult {
            logical_plan,
            optimized_plan,
            physical_plan,
        })
    }

    /// Runs the query, handing every result batch to `callback`.
    ///
    /// Planning errors are reported before the callback is first invoked.
    /// Execution stops at the first error from an operator or from the
    /// callback, and that error is returned.
    pub fn execute<F, E>(&self, callback: F) -> std::result::Result<(), E>
    where
        F: FnMut(RecordBatch) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let plan = self.engine.optimize(self.builder.plan().clone());
        debug!(plan = %plan, "executing query");
        let physical = self.engine.compile(&plan)?;
        physical.execute(&self.engine.allocator, callback)
    }

    /// Runs the query and collects every result batch.
    pub fn collect(&self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        self.execute::<_, Error>(|batch| {
            batches.push(batch);
            Ok(())
        })?;
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, lit, sum};
    use crate::config::ScanOptions;
    use crate::provider::{MemTable, MemTableProvider};
    use strata_core::{DefaultAllocator, Value};
    use strata_dynparquet::{BufferWriter, DynamicColumns, DynamicSchema, WriterOptions};

    fn engine() -> Engine {
        let schema = DynamicSchema::sample();
        let labels = DynamicColumns::new().with_group("labels", ["test"]).unwrap();
        let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
        writer
            .write_rows(&[
                vec![
                    Value::from("cpu"),
                    Value::from("abc"),
                    Value::from("main"),
                    Value::Int64(1),
                    Value::Int64(2),
                ],
                vec![
                    Value::from("cpu"),
                    Value::from("abc"),
                    Value::from("main"),
                    Value::Int64(2),
                    Value::Int64(3),
                ],
            ])
            .unwrap();
        let table = MemTable::new("stacktraces", schema)
            .with_bytes(writer.finish().unwrap())
            .unwrap();
        let provider = MemTableProvider::new().with_table(table);
        Engine::new(Arc::new(DefaultAllocator::new()), Arc::new(provider))
    }

    fn query(engine: &Engine) -> QueryBuilder {
        engine
            .scan_table("stacktraces")
            .filter(col("labels.test").eq(lit("abc")))
            .aggregate(sum(col("value")).alias("value_sum"), vec![col("stacktrace")])
            .project(vec![col("stacktrace"), col("value_sum")])
    }

    #[test]
    fn test_explain_stages() {
        let explain = query(&engine()).explain().unwrap();
        assert!(explain.logical_plan.contains("Filter: labels.test == \"abc\""));
        assert!(!explain.optimized_plan.contains("Filter:"));
        assert!(explain
            .optimized_plan
            .contains("filter=labels.test == \"abc\""));
        assert!(explain.physical_plan.starts_with("ProjectionExec: stacktrace, value_sum"));
    }

    #[test]
    fn test_collect() {
        let batches = query(&engine()).collect().unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(
            Value::from_array(batch.column(1).as_ref(), 0).unwrap(),
            Value::Int64(5)
        );
    }

    #[test]
    fn test_query_builder_is_persistent() {
        let engine = engine();
        let base = engine.scan_table("stacktraces");
        let _filtered = base.filter(col("value").gt(lit(2i64)));
        assert!(matches!(base.plan(), LogicalPlan::TableScan(_)));
    }

    #[test]
    fn test_scan_options_flow_into_scans() {
        let config = EngineConfig::default().with_scan_options(ScanOptions::default().with_batch_size(1));
        let engine = engine().with_config(config);
        let batches = engine.scan_table("stacktraces").collect().unwrap();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_missing_table() {
        let err = engine().scan_table("nope").collect().unwrap_err();
        assert!(matches!(err, Error::TableNotFound { ref name } if name == "nope"));
    }
}
