//! Distinct executor.

use crate::ast::Expr;
use crate::executor::expr::resolve_columns;
use crate::executor::Operator;
use crate::planner::PhysicalPlan;
use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::row::{OwnedRow, RowConverter, Rows, SortField};
use hashbrown::HashSet;
use std::sync::Arc;
use strata_core::{Error, Reservation, Result};
use tracing::trace;

/// Row-encoded keys over a set of columns of one schema.
pub(crate) struct DistinctKeys {
    indices: Vec<usize>,
    converter: RowConverter,
}

impl DistinctKeys {
    /// Resolves `exprs` against `schema`. Each expression must be a column
    /// or a dynamic group; groups expand to their members.
    pub(crate) fn try_new(exprs: &[Expr], schema: &Schema, context: &str) -> Result<Self> {
        let mut indices = Vec::new();
        for expr in exprs {
            let resolved = resolve_columns(expr, schema, context)?.ok_or_else(|| {
                Error::invalid_expression(expr.to_string(), "distinct requires column references")
            })?;
            for index in resolved {
                if !indices.contains(&index) {
                    indices.push(index);
                }
            }
        }
        let fields = indices
            .iter()
            .map(|&i| SortField::new(schema.field(i).data_type().clone()))
            .collect();
        Ok(Self {
            indices,
            converter: RowConverter::new(fields)?,
        })
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn rows(&self, batch: &RecordBatch) -> Result<Rows> {
        let columns: Vec<ArrayRef> = self
            .indices
            .iter()
            .map(|&i| batch.column(i).clone())
            .collect();
        Ok(self.converter.convert_columns(&columns)?)
    }

    /// Keeps the first row of every key within `batch`.
    pub(crate) fn dedup_batch(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        if self.indices.is_empty() {
            return Ok(batch.slice(0, batch.num_rows().min(1)));
        }
        let rows = self.rows(batch)?;
        let mut seen = HashSet::with_capacity(rows.num_rows());
        let keep: Vec<u32> = (0..rows.num_rows())
            .filter(|&i| seen.insert(rows.row(i)))
            .map(|i| i as u32)
            .collect();
        if keep.len() == batch.num_rows() {
            return Ok(batch.clone());
        }
        Ok(take_record_batch(batch, &UInt32Array::from(keep))?)
    }
}

/// Distinct executor - emits each distinct key combination once.
///
/// Output holds only the key columns. Keys seen so far are kept for the
/// lifetime of the operator and accounted against its reservation.
pub struct DistinctExec {
    input: Box<PhysicalPlan>,
    columns: Vec<Expr>,
    keys: DistinctKeys,
    schema: SchemaRef,
    seen: HashSet<OwnedRow>,
    emitted_empty_key: bool,
    reservation: Reservation,
}

impl DistinctExec {
    /// Creates a distinct executor over `input`.
    pub fn try_new(input: PhysicalPlan, columns: Vec<Expr>, reservation: Reservation) -> Result<Self> {
        let input_schema = input.schema();
        let keys = DistinctKeys::try_new(&columns, &input_schema, "distinct")?;
        let schema = Arc::new(input_schema.project(keys.indices())?);
        Ok(Self {
            input: Box::new(input),
            columns,
            keys,
            schema,
            seen: HashSet::new(),
            emitted_empty_key: false,
            reservation,
        })
    }

    pub(crate) fn input(&self) -> &PhysicalPlan {
        &self.input
    }

    fn process(&mut self, batch: &RecordBatch) -> Result<RecordBatch> {
        let keys = batch.project(self.keys.indices())?;
        if self.keys.indices().is_empty() {
            // Without key columns every row shares one empty key.
            let rows = if self.emitted_empty_key { 0 } else { keys.num_rows().min(1) };
            self.emitted_empty_key |= rows > 0;
            return Ok(keys.slice(0, rows));
        }

        let rows = self.keys.rows(batch)?;
        let mut keep = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let row = row.owned();
            if self.seen.contains(&row) {
                continue;
            }
            self.reservation
                .try_grow(row.as_ref().len() + std::mem::size_of::<OwnedRow>())?;
            self.seen.insert(row);
            keep.push(i as u32);
        }
        if keep.len() == keys.num_rows() {
            return Ok(keys);
        }
        Ok(take_record_batch(&keys, &UInt32Array::from(keep))?)
    }
}

impl Operator for DistinctExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        while let Some(batch) = self.input.next_batch()? {
            let output = self.process(&batch)?;
            trace!(
                input_rows = batch.num_rows(),
                output_rows = output.num_rows(),
                distinct_keys = self.seen.len(),
                "distinct batch"
            );
            if output.num_rows() > 0 {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        format!("DistinctExec: [{}]", columns.join(", "))
    }
}
