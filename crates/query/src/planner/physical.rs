//! Physical query plan.
//!
//! A physical plan is a tree of executors compiled from a logical plan
//! against one query-wide concrete schema: the table's [`DynamicSchema`]
//! expanded with every dynamic member any buffer realizes, plus every
//! member the query names. Each buffer's batches are reshaped to that
//! schema, members a buffer does not realize reading as null.

use crate::ast::ColumnMatcher;
use crate::config::ScanOptions;
use crate::executor::{
    DistinctExec, FilterExec, HashAggregateExec, Operator, ProjectionExec, SchemaScanExec,
    TableScanExec,
};
use crate::planner::LogicalPlan;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::fmt;
use std::sync::Arc;
use strata_core::{Allocator, Error, Reservation, Result};
use strata_dynparquet::{split_dynamic_column_name, DynamicColumns, DynamicSchema};
use tracing::{debug, trace};

/// Physical query plan node.
pub enum PhysicalPlan {
    TableScan(TableScanExec),
    SchemaScan(SchemaScanExec),
    Filter(FilterExec),
    HashAggregate(HashAggregateExec),
    Distinct(DistinctExec),
    Projection(ProjectionExec),
}

impl PhysicalPlan {
    fn operator(&self) -> &dyn Operator {
        match self {
            PhysicalPlan::TableScan(op) => op,
            PhysicalPlan::SchemaScan(op) => op,
            PhysicalPlan::Filter(op) => op,
            PhysicalPlan::HashAggregate(op) => op,
            PhysicalPlan::Distinct(op) => op,
            PhysicalPlan::Projection(op) => op,
        }
    }

    fn operator_mut(&mut self) -> &mut dyn Operator {
        match self {
            PhysicalPlan::TableScan(op) => op,
            PhysicalPlan::SchemaScan(op) => op,
            PhysicalPlan::Filter(op) => op,
            PhysicalPlan::HashAggregate(op) => op,
            PhysicalPlan::Distinct(op) => op,
            PhysicalPlan::Projection(op) => op,
        }
    }

    /// Returns the schema of the batches this plan produces.
    pub fn schema(&self) -> SchemaRef {
        self.operator().schema()
    }

    /// Pulls the next batch from the root operator.
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.operator_mut().next_batch()
    }

    /// Returns the child plan, if any.
    pub fn input(&self) -> Option<&PhysicalPlan> {
        match self {
            PhysicalPlan::TableScan(_) | PhysicalPlan::SchemaScan(_) => None,
            PhysicalPlan::Filter(op) => Some(op.input()),
            PhysicalPlan::HashAggregate(op) => Some(op.input()),
            PhysicalPlan::Distinct(op) => Some(op.input()),
            PhysicalPlan::Projection(op) => Some(op.input()),
        }
    }

    /// Renders the operator tree, one operator per line.
    pub fn display_indent(&self) -> String {
        self.to_string()
    }

    /// Runs the plan to completion, handing every non-empty batch to
    /// `callback` in production order.
    ///
    /// Execution stops at the first error, whether raised by an operator or
    /// returned by the callback. The batch being delivered is accounted
    /// against `allocator` until the callback returns.
    pub fn execute<F, E>(
        mut self,
        allocator: &Arc<dyn Allocator>,
        mut callback: F,
    ) -> std::result::Result<(), E>
    where
        F: FnMut(RecordBatch) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let mut reservation = Reservation::new(Arc::clone(allocator));
        let mut batches = 0usize;
        let mut rows = 0usize;
        while let Some(batch) = self.next_batch()? {
            if batch.num_rows() == 0 {
                continue;
            }
            reservation.try_resize(batch.get_array_memory_size())?;
            batches += 1;
            rows += batch.num_rows();
            trace!(batch = batches, rows = batch.num_rows(), "delivering batch");
            callback(batch)?;
        }
        reservation.free();
        debug!(batches, rows, "query finished");
        Ok(())
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:width$}{}", "", self.operator().describe(), width = depth * 2)?;
        match self.input() {
            Some(input) => input.fmt_indent(f, depth + 1),
            None => Ok(()),
        }
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

impl fmt::Debug for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

struct BuildContext<'a> {
    allocator: &'a Arc<dyn Allocator>,
    concrete: SchemaRef,
    batch_size: usize,
}

impl BuildContext<'_> {
    fn reservation(&self) -> Reservation {
        Reservation::new(Arc::clone(self.allocator))
    }
}

/// Compiles a logical plan into an executable physical plan.
///
/// `schema` is the schema of the table the plan scans. The plan's scan must
/// carry a resolved table, since reconciliation needs its buffers. Operator
/// memory is accounted against `allocator`.
pub fn build(
    allocator: &Arc<dyn Allocator>,
    schema: &DynamicSchema,
    plan: &LogicalPlan,
) -> Result<PhysicalPlan> {
    let table = plan
        .table()
        .ok_or_else(|| Error::table_not_found(plan.table_name()))?;
    let buffers = table.buffers();

    // Members named by the query resolve even when no buffer realizes them.
    let mut referenced = DynamicColumns::new();
    let mut invalid = None;
    plan.for_each_expr(&mut |expr| {
        for matcher in expr.columns_used() {
            let ColumnMatcher::Static(name) = matcher else {
                continue;
            };
            let Some((group, member)) = split_dynamic_column_name(&name) else {
                continue;
            };
            if !schema.is_dynamic_group(group) {
                continue;
            }
            if let Err(e) = referenced.insert_member(group, member) {
                invalid.get_or_insert_with(|| {
                    Error::invalid_expression(expr.to_string(), e.to_string())
                });
            }
        }
    });
    if let Some(err) = invalid {
        return Err(err);
    }

    let union = DynamicColumns::union(
        buffers
            .iter()
            .map(|b| b.dynamic_columns())
            .chain(std::iter::once(&referenced)),
    );
    let concrete = schema.concrete_schema(&union);
    debug!(
        table = %plan.table_name(),
        buffers = buffers.len(),
        dynamic_columns = %union,
        columns = concrete.fields().len(),
        "reconciled query schema"
    );

    let context = BuildContext {
        allocator,
        concrete,
        batch_size: scan_options(plan).batch_size,
    };
    build_plan(&context, plan)
}

fn scan_options(plan: &LogicalPlan) -> ScanOptions {
    match plan {
        LogicalPlan::TableScan(scan) => scan.options,
        LogicalPlan::SchemaScan(scan) => scan.options,
        other => other.input().map(scan_options).unwrap_or_default(),
    }
}

fn build_plan(context: &BuildContext<'_>, plan: &LogicalPlan) -> Result<PhysicalPlan> {
    let physical = match plan {
        LogicalPlan::TableScan(scan) => PhysicalPlan::TableScan(TableScanExec::try_new(
            scan,
            &context.concrete,
            context.reservation(),
        )?),
        LogicalPlan::SchemaScan(scan) => PhysicalPlan::SchemaScan(SchemaScanExec::try_new(scan)?),
        LogicalPlan::Filter { input, predicate } => PhysicalPlan::Filter(FilterExec::try_new(
            build_plan(context, input)?,
            predicate.clone(),
        )?),
        LogicalPlan::Aggregate {
            input,
            aggregate,
            group_by,
        } => PhysicalPlan::HashAggregate(HashAggregateExec::try_new(
            build_plan(context, input)?,
            aggregate.clone(),
            group_by.clone(),
            context.batch_size,
            context.reservation(),
        )?),
        LogicalPlan::Distinct { input, columns } => PhysicalPlan::Distinct(DistinctExec::try_new(
            build_plan(context, input)?,
            columns.clone(),
            context.reservation(),
        )?),
        LogicalPlan::Projection { input, exprs } => PhysicalPlan::Projection(
            ProjectionExec::try_new(build_plan(context, input)?, exprs.clone())?,
        ),
    };
    Ok(physical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, dyn_col, lit, sum};
    use crate::planner::{SchemaScan, TableScan};
    use crate::provider::{MemTable, TableReader};
    use strata_core::{DefaultAllocator, Value};
    use strata_dynparquet::{BufferWriter, WriterOptions};

    fn table(members: &[&[&str]]) -> Arc<dyn TableReader> {
        let schema = DynamicSchema::sample();
        let mut table = MemTable::new("t", schema.clone());
        for members in members {
            let labels = DynamicColumns::new().with_group("labels", members.iter().copied()).unwrap();
            let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
            let mut row = vec![Value::from("cpu")];
            row.extend(members.iter().map(|m| Value::from(*m)));
            row.extend([Value::from("main"), Value::Int64(1), Value::Int64(2)]);
            writer.write_rows(&[row]).unwrap();
            table.insert_bytes(writer.finish().unwrap()).unwrap();
        }
        Arc::new(table)
    }

    fn allocator() -> Arc<dyn Allocator> {
        Arc::new(DefaultAllocator::new())
    }

    fn scan(table: &Arc<dyn TableReader>) -> LogicalPlan {
        LogicalPlan::table_scan(TableScan::new("t", Some(table.clone()), ScanOptions::default()))
    }

    fn collect(plan: PhysicalPlan) -> Vec<RecordBatch> {
        let mut batches = Vec::new();
        plan.execute::<_, Error>(&allocator(), |batch| {
            batches.push(batch);
            Ok(())
        })
        .unwrap();
        batches
    }

    #[test]
    fn test_schema_is_union_of_buffers() {
        let table = table(&[&["a"], &["b"]]);
        let plan = LogicalPlan::projection(scan(&table), vec![dyn_col("labels")]);
        let physical = build(&allocator(), &DynamicSchema::sample(), &plan).unwrap();
        let names: Vec<String> = physical
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["labels.a", "labels.b"]);

        let batches = collect(physical);
        assert_eq!(batches.len(), 2);
        assert_eq!(Value::from_array(batches[0].column(1).as_ref(), 0).unwrap(), Value::Null);
        assert_eq!(Value::from_array(batches[1].column(1).as_ref(), 0).unwrap(), Value::from("b"));
    }

    #[test]
    fn test_referenced_member_reads_null() {
        let table = table(&[&["a"]]);
        let plan = LogicalPlan::projection(
            LogicalPlan::filter(scan(&table), col("labels.zzz").eq(lit("x"))),
            vec![col("value")],
        );
        let physical = build(&allocator(), &DynamicSchema::sample(), &plan).unwrap();
        assert!(collect(physical).is_empty());
    }

    #[test]
    fn test_display_indent() {
        let table = table(&[&["a"]]);
        let plan = LogicalPlan::aggregate(
            LogicalPlan::filter(scan(&table), col("labels.a").eq(lit("a"))),
            sum(col("value")).alias("total"),
            vec![col("stacktrace")],
        );
        let physical = build(&allocator(), &DynamicSchema::sample(), &plan).unwrap();
        let expected = "\
HashAggregateExec: sum(value) AS total group_by=[stacktrace]
  FilterExec: labels.a == \"a\"
    TableScanExec: t columns=[example_type, labels.a, stacktrace, timestamp, value]
";
        assert_eq!(physical.display_indent(), expected);
    }

    #[test]
    fn test_unresolved_table() {
        let plan = LogicalPlan::schema_scan(SchemaScan::new("nope", None, ScanOptions::default()));
        let err = build(&allocator(), &DynamicSchema::sample(), &plan).unwrap_err();
        assert!(matches!(err, Error::TableNotFound { .. }));
    }

    #[test]
    fn test_callback_error_stops_execution() {
        let table = table(&[&["a"], &["b"]]);
        let physical = build(&allocator(), &DynamicSchema::sample(), &scan(&table)).unwrap();
        let mut calls = 0;
        let result = physical.execute(&allocator(), |_| {
            calls += 1;
            Err(Error::Internal("stop".into()))
        });
        assert!(matches!(result, Err(Error::Internal(ref m)) if m == "stop"));
        assert_eq!(calls, 1);
    }
}
