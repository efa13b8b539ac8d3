//! Schema scan executor.

use crate::executor::Operator;
use crate::planner::SchemaScan;
use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use strata_core::{Error, Result};
use strata_dynparquet::SerializedBuffer;
use tracing::trace;

/// Name of the single output column of a schema scan.
pub const SCHEMA_SCAN_COLUMN: &str = "name";

/// Schema scan executor - emits, per row group, the names of the concrete
/// columns it realizes.
pub struct SchemaScanExec {
    table_name: String,
    buffers: Vec<Arc<SerializedBuffer>>,
    schema: SchemaRef,
    buffer_index: usize,
    row_group_index: usize,
}

impl SchemaScanExec {
    pub fn try_new(scan: &SchemaScan) -> Result<Self> {
        let table = scan
            .table
            .as_ref()
            .ok_or_else(|| Error::table_not_found(scan.table_name.clone()))?;
        Ok(Self {
            table_name: scan.table_name.clone(),
            buffers: table.buffers(),
            schema: Arc::new(Schema::new(vec![Field::new(
                SCHEMA_SCAN_COLUMN,
                DataType::Utf8,
                false,
            )])),
            buffer_index: 0,
            row_group_index: 0,
        })
    }
}

impl Operator for SchemaScanExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        while let Some(buffer) = self.buffers.get(self.buffer_index) {
            if self.row_group_index >= buffer.num_row_groups() {
                self.buffer_index += 1;
                self.row_group_index = 0;
                continue;
            }
            let row_group = buffer.dynamic_row_group(self.row_group_index)?;
            self.row_group_index += 1;

            let names = row_group.column_names();
            if names.is_empty() {
                continue;
            }
            trace!(
                table = %self.table_name,
                row_group = row_group.index(),
                columns = names.len(),
                "schema scan row group"
            );
            let array = StringArray::from(names);
            return Ok(Some(RecordBatch::try_new(
                self.schema.clone(),
                vec![Arc::new(array)],
            )?));
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("SchemaScanExec: {}", self.table_name)
    }
}
