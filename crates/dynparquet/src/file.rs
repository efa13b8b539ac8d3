//! Physical Parquet file access.

use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReader,
    ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::ProjectionMask;
use parquet::file::metadata::{ParquetMetaData, RowGroupMetaData};
use parquet::file::statistics::Statistics;
use strata_core::{Error, Result, Value};

/// An opened Parquet file held in memory.
///
/// The footer is parsed once on open; row-group reads reuse it. Cloning is
/// cheap and shares both the bytes and the parsed metadata.
#[derive(Clone, Debug)]
pub struct ParquetFile {
    data: Bytes,
    metadata: ArrowReaderMetadata,
}

impl ParquetFile {
    /// Parses the footer of a Parquet file.
    pub fn open(data: Bytes) -> Result<Self> {
        let metadata = ArrowReaderMetadata::load(&data, ArrowReaderOptions::new())?;
        Ok(Self { data, metadata })
    }

    /// Returns the parsed Parquet metadata.
    pub fn metadata(&self) -> &ParquetMetaData {
        self.metadata.metadata()
    }

    /// Returns the Arrow schema of the file.
    pub fn arrow_schema(&self) -> &SchemaRef {
        self.metadata.schema()
    }

    #[inline]
    pub fn num_row_groups(&self) -> usize {
        self.metadata().num_row_groups()
    }

    /// Returns the total number of rows in the file.
    pub fn num_rows(&self) -> usize {
        self.metadata().file_metadata().num_rows().max(0) as usize
    }

    /// Returns the number of rows in row group `index`.
    pub fn row_group_num_rows(&self, index: usize) -> Result<usize> {
        Ok(self.row_group(index)?.num_rows().max(0) as usize)
    }

    /// Looks up a file-level key/value metadata entry.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.metadata()
            .file_metadata()
            .key_value_metadata()?
            .iter()
            .find(|kv| kv.key == key)
            .and_then(|kv| kv.value.as_deref())
    }

    pub(crate) fn row_group(&self, index: usize) -> Result<&RowGroupMetaData> {
        let count = self.num_row_groups();
        if index >= count {
            return Err(Error::RowGroupOutOfRange { index, count });
        }
        Ok(self.metadata().row_group(index))
    }

    /// Returns the statistics of a top-level column in row group `index`.
    pub(crate) fn column_statistics(
        &self,
        index: usize,
        column: &str,
    ) -> Result<Option<ColumnStatistics>> {
        let row_group = self.row_group(index)?;
        let position = match self.arrow_schema().index_of(column) {
            Ok(position) if position < row_group.num_columns() => position,
            _ => return Ok(None),
        };
        Ok(row_group
            .column(position)
            .statistics()
            .map(ColumnStatistics::from_parquet))
    }

    /// Opens a reader over one row group, decoding only the given top-level
    /// columns.
    pub fn read_row_group(
        &self,
        index: usize,
        columns: &[usize],
        batch_size: usize,
    ) -> Result<ParquetRecordBatchReader> {
        self.row_group(index)?;
        let mask = ProjectionMask::roots(self.metadata.parquet_schema(), columns.iter().copied());
        let reader =
            ParquetRecordBatchReaderBuilder::new_with_metadata(self.data.clone(), self.metadata.clone())
                .with_row_groups(vec![index])
                .with_projection(mask)
                .with_batch_size(batch_size.max(1))
                .build()?;
        Ok(reader)
    }
}

/// Min/max/null statistics of one column chunk.
///
/// Bounds are `None` when the writer recorded none or the physical type has
/// no [`Value`] counterpart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStatistics {
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub null_count: Option<u64>,
}

impl ColumnStatistics {
    fn from_parquet(stats: &Statistics) -> Self {
        let (min, max) = match stats {
            Statistics::Boolean(s) => (
                s.min_opt().map(|v| Value::Boolean(*v)),
                s.max_opt().map(|v| Value::Boolean(*v)),
            ),
            Statistics::Int32(s) => (
                s.min_opt().map(|v| Value::Int64(*v as i64)),
                s.max_opt().map(|v| Value::Int64(*v as i64)),
            ),
            Statistics::Int64(s) => (
                s.min_opt().map(|v| Value::Int64(*v)),
                s.max_opt().map(|v| Value::Int64(*v)),
            ),
            Statistics::Double(s) => (
                s.min_opt().map(|v| Value::Float64(*v)),
                s.max_opt().map(|v| Value::Float64(*v)),
            ),
            Statistics::ByteArray(s) => (
                s.min_opt()
                    .and_then(|v| v.as_utf8().ok())
                    .map(|v| Value::String(v.to_string())),
                s.max_opt()
                    .and_then(|v| v.as_utf8().ok())
                    .map(|v| Value::String(v.to_string())),
            ),
            _ => (None, None),
        };
        Self {
            min,
            max,
            null_count: stats.null_count_opt(),
        }
    }
}
