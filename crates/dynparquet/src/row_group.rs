//! Row groups with dynamic column membership.

use crate::dynamic_columns::DynamicColumns;
use crate::file::{ColumnStatistics, ParquetFile};
use crate::schema::{conform_batch, split_dynamic_column_name, DynamicSchema};
use arrow::array::new_null_array;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReader;
use std::sync::Arc;
use strata_core::{Result, Value};

/// Batch size used by the row-oriented iterators.
const ROW_BATCH_SIZE: usize = 1024;

/// One physical row group together with the dynamic membership it realizes.
///
/// The membership is borrowed from the owning buffer unless overridden with
/// [`with_dynamic_columns`](Self::with_dynamic_columns).
#[derive(Clone, Copy, Debug)]
pub struct RowGroupReader<'a> {
    file: &'a ParquetFile,
    index: usize,
    dynamic_columns: &'a DynamicColumns,
}

impl<'a> RowGroupReader<'a> {
    pub(crate) fn new(
        file: &'a ParquetFile,
        index: usize,
        dynamic_columns: &'a DynamicColumns,
    ) -> Self {
        Self {
            file,
            index,
            dynamic_columns,
        }
    }

    /// Replaces the membership this row group realizes.
    ///
    /// The override lives on this reader only. Table scans reconcile
    /// against each buffer's file-level mapping.
    pub fn with_dynamic_columns(mut self, dynamic_columns: &'a DynamicColumns) -> Self {
        self.dynamic_columns = dynamic_columns;
        self
    }

    /// Returns the position of this row group in its file.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn dynamic_columns(&self) -> &'a DynamicColumns {
        self.dynamic_columns
    }

    pub fn num_rows(&self) -> usize {
        self.file.row_group_num_rows(self.index).unwrap_or(0)
    }

    /// Returns the concrete columns this row group realizes, in file order.
    ///
    /// A dynamic member present in the file schema but absent from this row
    /// group's membership is not realized here.
    pub fn column_names(&self) -> Vec<String> {
        self.file
            .arrow_schema()
            .fields()
            .iter()
            .map(|f| f.name())
            .filter(|name| self.realizes(name))
            .cloned()
            .collect()
    }

    /// Returns true if this row group realizes the concrete column `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.file.arrow_schema().index_of(name).is_ok() && self.realizes(name)
    }

    fn realizes(&self, name: &str) -> bool {
        match split_dynamic_column_name(name) {
            Some((group, member)) => self.dynamic_columns.contains(group, member),
            None => true,
        }
    }

    /// Returns the chunk statistics of a realized column.
    pub fn column_statistics(&self, name: &str) -> Option<ColumnStatistics> {
        if !self.has_column(name) {
            return None;
        }
        self.file.column_statistics(self.index, name).ok().flatten()
    }

    /// Reads the row group as batches shaped exactly like `target`.
    ///
    /// Only the realized columns `target` names are decoded; every other
    /// target column is filled with nulls.
    pub fn batches(&self, target: &SchemaRef, batch_size: usize) -> Result<RowGroupBatches> {
        let schema = self.file.arrow_schema();
        let mut roots: Vec<usize> = target
            .fields()
            .iter()
            .filter(|f| self.realizes(f.name()))
            .filter_map(|f| schema.index_of(f.name()).ok())
            .collect();
        roots.sort_unstable();

        let state = if roots.is_empty() {
            BatchState::Nulls {
                remaining: self.num_rows(),
                batch_size: batch_size.max(1),
            }
        } else {
            BatchState::Read(self.file.read_row_group(self.index, &roots, batch_size)?)
        };
        Ok(RowGroupBatches {
            target: target.clone(),
            state,
        })
    }

    /// Iterates over rows shaped as the static columns plus the dynamic
    /// members this row group realizes.
    ///
    /// Every call returns a fresh iterator starting at the first row.
    pub fn dynamic_rows(&self) -> Result<DynamicRows> {
        let schema = self.file.arrow_schema();
        let fields: Vec<_> = schema
            .fields()
            .iter()
            .filter(|f| self.realizes(f.name()))
            .cloned()
            .collect();
        let target = Arc::new(Schema::new(fields));
        Ok(DynamicRows::new(self.batches(&target, ROW_BATCH_SIZE)?))
    }

    /// Iterates over rows shaped by `schema` expanded with the query-wide
    /// `superset` membership. Members this row group does not realize are
    /// null.
    pub fn reconciled_rows(
        &self,
        schema: &DynamicSchema,
        superset: &DynamicColumns,
    ) -> Result<DynamicRows> {
        let target = schema.concrete_schema(superset);
        Ok(DynamicRows::new(self.batches(&target, ROW_BATCH_SIZE)?))
    }
}

enum BatchState {
    Read(ParquetRecordBatchReader),
    Nulls { remaining: usize, batch_size: usize },
}

/// Lazy sequence of record batches from one row group, conformed to a target
/// schema.
pub struct RowGroupBatches {
    target: SchemaRef,
    state: BatchState,
}

impl RowGroupBatches {
    pub fn schema(&self) -> &SchemaRef {
        &self.target
    }
}

impl Iterator for RowGroupBatches {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            BatchState::Read(reader) => {
                let batch = reader.next()?;
                Some(
                    batch
                        .map_err(Into::into)
                        .and_then(|batch| conform_batch(&batch, &self.target)),
                )
            }
            BatchState::Nulls {
                remaining,
                batch_size,
            } => {
                if *remaining == 0 {
                    return None;
                }
                let rows = (*remaining).min(*batch_size);
                *remaining -= rows;
                let columns = self
                    .target
                    .fields()
                    .iter()
                    .map(|f| new_null_array(f.data_type(), rows))
                    .collect();
                let options = RecordBatchOptions::new().with_row_count(Some(rows));
                Some(
                    RecordBatch::try_new_with_options(self.target.clone(), columns, &options)
                        .map_err(Into::into),
                )
            }
        }
    }
}

/// One row of a row group.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicRow {
    schema: SchemaRef,
    values: Vec<Value>,
}

impl DynamicRow {
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value of the concrete column `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.schema.index_of(name).ok()?;
        self.values.get(index)
    }
}

/// Row-oriented view over [`RowGroupBatches`].
pub struct DynamicRows {
    batches: RowGroupBatches,
    current: Option<RecordBatch>,
    row: usize,
}

impl DynamicRows {
    fn new(batches: RowGroupBatches) -> Self {
        Self {
            batches,
            current: None,
            row: 0,
        }
    }

    /// Returns the shape every row of this iterator has.
    pub fn schema(&self) -> &SchemaRef {
        self.batches.schema()
    }
}

impl Iterator for DynamicRows {
    type Item = Result<DynamicRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.current {
                if self.row < batch.num_rows() {
                    let row = self.row;
                    self.row += 1;
                    let values = batch
                        .columns()
                        .iter()
                        .map(|column| Value::from_array(column.as_ref(), row))
                        .collect::<Result<Vec<_>>>();
                    return Some(values.map(|values| DynamicRow {
                        schema: batch.schema(),
                        values,
                    }));
                }
            }
            match self.batches.next()? {
                Ok(batch) => {
                    self.current = Some(batch);
                    self.row = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
