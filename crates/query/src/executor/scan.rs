//! Table scan executor.
//!
//! Reads a table's buffers row group by row group, reshaping every batch to
//! the query-wide concrete schema. Whatever the optimizers pushed into the
//! logical scan is applied here: only the needed columns are decoded, the
//! filter both prunes row groups and filters rows, and the distinct columns
//! drop duplicate rows within each batch.

use crate::ast::{ColumnMatcher, Expr};
use crate::config::ScanOptions;
use crate::executor::distinct::DistinctKeys;
use crate::executor::pruning::can_skip;
use crate::executor::{Operator, PhysicalExpr};
use crate::planner::TableScan;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use strata_core::{Error, Reservation, Result};
use strata_dynparquet::{RowGroupBatches, SerializedBuffer};
use tracing::{debug, trace};

/// Counters collected while scanning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanMetrics {
    pub row_groups_read: usize,
    pub row_groups_pruned: usize,
    pub rows_read: usize,
    pub rows_emitted: usize,
}

struct ScanFilter {
    expr: Expr,
    physical: PhysicalExpr,
}

/// Table scan executor.
pub struct TableScanExec {
    table_name: String,
    buffers: Vec<Arc<SerializedBuffer>>,
    options: ScanOptions,
    /// Columns decoded from storage, in concrete schema order.
    read_schema: SchemaRef,
    /// Positions in `read_schema` of the columns handed to the parent.
    output_indices: Vec<usize>,
    schema: SchemaRef,
    filter: Option<ScanFilter>,
    distinct: Option<DistinctKeys>,
    reservation: Reservation,
    buffer_index: usize,
    row_group_index: usize,
    current: Option<RowGroupBatches>,
    metrics: ScanMetrics,
    finished: bool,
}

impl TableScanExec {
    /// Creates a scan of `scan` over the query-wide `concrete` schema.
    pub fn try_new(scan: &TableScan, concrete: &SchemaRef, reservation: Reservation) -> Result<Self> {
        let table = scan
            .table
            .as_ref()
            .ok_or_else(|| Error::table_not_found(scan.table_name.clone()))?;

        let mut matchers: Vec<ColumnMatcher> = Vec::new();
        for expr in scan.filter.iter().chain(scan.distinct.iter()) {
            for matcher in expr.columns_used() {
                if !matchers.contains(&matcher) {
                    matchers.push(matcher);
                }
            }
        }
        let is_output = |name: &str| match &scan.projection {
            Some(projection) => projection.iter().any(|m| m.matches(name)),
            None => true,
        };

        let mut read_fields = Vec::new();
        let mut output_indices = Vec::new();
        for field in concrete.fields() {
            let output = is_output(field.name());
            if output || matchers.iter().any(|m| m.matches(field.name())) {
                if output {
                    output_indices.push(read_fields.len());
                }
                read_fields.push(field.clone());
            }
        }
        let read_schema = Arc::new(Schema::new(read_fields));
        let schema = Arc::new(read_schema.project(&output_indices)?);

        let filter = match &scan.filter {
            Some(expr) => Some(ScanFilter {
                expr: expr.clone(),
                physical: PhysicalExpr::compile(expr, &read_schema, "table scan filter")?,
            }),
            None => None,
        };
        let distinct = if scan.distinct.is_empty() {
            None
        } else {
            Some(DistinctKeys::try_new(&scan.distinct, &read_schema, "table scan distinct")?)
        };

        Ok(Self {
            table_name: scan.table_name.clone(),
            buffers: table.buffers(),
            options: scan.options,
            read_schema,
            output_indices,
            schema,
            filter,
            distinct,
            reservation,
            buffer_index: 0,
            row_group_index: 0,
            current: None,
            metrics: ScanMetrics::default(),
            finished: false,
        })
    }

    pub fn metrics(&self) -> ScanMetrics {
        self.metrics
    }

    /// Opens the next row group that survives pruning. Returns false once
    /// every buffer is exhausted.
    fn advance(&mut self) -> Result<bool> {
        while self.buffer_index < self.buffers.len() {
            let buffer = Arc::clone(&self.buffers[self.buffer_index]);
            if self.row_group_index >= buffer.num_row_groups() {
                self.buffer_index += 1;
                self.row_group_index = 0;
                continue;
            }
            let row_group = buffer.dynamic_row_group(self.row_group_index)?;
            self.row_group_index += 1;

            if self.options.prune_row_groups {
                if let Some(filter) = &self.filter {
                    if can_skip(&filter.expr, &row_group) {
                        self.metrics.row_groups_pruned += 1;
                        trace!(
                            table = %self.table_name,
                            buffer = self.buffer_index,
                            row_group = row_group.index(),
                            "pruned row group"
                        );
                        continue;
                    }
                }
            }

            self.current = Some(row_group.batches(&self.read_schema, self.options.batch_size)?);
            self.metrics.row_groups_read += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn process(&mut self, batch: RecordBatch) -> Result<Option<RecordBatch>> {
        self.metrics.rows_read += batch.num_rows();
        self.reservation.try_resize(batch.get_array_memory_size())?;

        let batch = match &self.filter {
            Some(filter) => filter.physical.filter(&batch)?,
            None => batch,
        };
        let batch = match &self.distinct {
            Some(keys) => keys.dedup_batch(&batch)?,
            None => batch,
        };
        let batch = batch.project(&self.output_indices)?;
        if batch.num_rows() == 0 {
            return Ok(None);
        }
        self.metrics.rows_emitted += batch.num_rows();
        trace!(table = %self.table_name, rows = batch.num_rows(), "scan batch");
        Ok(Some(batch))
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.reservation.free();
            debug!(
                table = %self.table_name,
                row_groups_read = self.metrics.row_groups_read,
                row_groups_pruned = self.metrics.row_groups_pruned,
                rows_read = self.metrics.rows_read,
                rows_emitted = self.metrics.rows_emitted,
                "table scan finished"
            );
        }
    }
}

impl Operator for TableScanExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            if let Some(batches) = self.current.as_mut() {
                match batches.next() {
                    Some(batch) => {
                        if let Some(batch) = self.process(batch?)? {
                            return Ok(Some(batch));
                        }
                        continue;
                    }
                    None => self.current = None,
                }
            }
            if !self.advance()? {
                self.finish();
                return Ok(None);
            }
        }
    }

    fn describe(&self) -> String {
        let columns: Vec<&str> = self.schema.fields().iter().map(|f| f.name().as_str()).collect();
        let mut out = format!("TableScanExec: {} columns=[{}]", self.table_name, columns.join(", "));
        if let Some(filter) = &self.filter {
            out.push_str(&format!(" filter={}", filter.expr));
        }
        if self.distinct.is_some() {
            out.push_str(" distinct");
        }
        out
    }
}
