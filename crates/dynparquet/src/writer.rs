//! Writing serialized buffers.

use crate::dynamic_columns::{DynamicColumns, DYNAMIC_COLUMNS_KEY};
use crate::schema::{conform_batch, DynamicSchema};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use strata_core::{Error, Result, Value};

/// Configuration for [`BufferWriter`].
#[derive(Clone, Debug)]
pub struct WriterOptions {
    /// Maximum rows per row group.
    pub max_row_group_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_row_group_size: 8192,
        }
    }
}

impl WriterOptions {
    pub fn with_max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = rows.max(1);
        self
    }
}

/// Writes record batches into an in-memory Parquet buffer whose footer
/// records the dynamic membership it was written with.
pub struct BufferWriter {
    schema: SchemaRef,
    writer: ArrowWriter<Vec<u8>>,
}

impl BufferWriter {
    /// Creates a writer for the concrete schema of `schema` under
    /// `dynamic_columns`.
    pub fn try_new(
        schema: &DynamicSchema,
        dynamic_columns: &DynamicColumns,
        options: WriterOptions,
    ) -> Result<Self> {
        for (group, _) in dynamic_columns.iter() {
            if !schema.is_dynamic_group(group) {
                return Err(Error::invalid_schema(format!(
                    "{} is not a dynamic column of {}",
                    group,
                    schema.name()
                )));
            }
        }
        let concrete = schema.concrete_schema(dynamic_columns);
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(options.max_row_group_size)
            .set_key_value_metadata(Some(vec![KeyValue::new(
                DYNAMIC_COLUMNS_KEY.to_string(),
                dynamic_columns.serialize(),
            )]))
            .build();
        let writer = ArrowWriter::try_new(Vec::new(), concrete.clone(), Some(props))?;
        Ok(Self {
            schema: concrete,
            writer,
        })
    }

    /// Returns the concrete schema batches are written with.
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Writes a batch. Columns are matched by name; absent nullable columns
    /// are written as nulls.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        let batch_schema = batch.schema();
        if let Some(extra) = batch_schema
            .fields()
            .iter()
            .find(|f| self.schema.index_of(f.name()).is_err())
        {
            return Err(Error::invalid_schema(format!(
                "column {} is not part of the buffer schema",
                extra.name()
            )));
        }
        let batch = conform_batch(batch, &self.schema)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    /// Writes rows given in concrete schema order.
    pub fn write_rows(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        let width = self.schema.fields().len();
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(Error::invalid_schema(format!(
                "row has {} values, expected {}",
                row.len(),
                width
            )));
        }
        let columns = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let values: Vec<Value> = rows.iter().map(|row| row[i].clone()).collect();
                Value::build_array(&values, field.data_type())
            })
            .collect::<Result<Vec<_>>>()?;
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    /// Closes the current row group. The next write starts a new one.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the footer and returns the file bytes.
    pub fn finish(self) -> Result<Bytes> {
        let buffer = self.writer.into_inner()?;
        Ok(Bytes::from(buffer))
    }
}
