//! Serialized buffers: Parquet files carrying dynamic column membership.

use crate::dynamic_columns::{DynamicColumns, DYNAMIC_COLUMNS_KEY};
use crate::file::ParquetFile;
use crate::row_group::RowGroupReader;
use bytes::Bytes;
use strata_core::{Error, Result};
use tracing::debug;

/// A Parquet file together with its file-level [`DynamicColumns`].
///
/// A file without the dynamic columns footer entry is not a valid buffer
/// and is rejected on open.
#[derive(Clone, Debug)]
pub struct SerializedBuffer {
    file: ParquetFile,
    dynamic_columns: DynamicColumns,
}

impl SerializedBuffer {
    /// Opens a buffer from raw Parquet bytes.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        Self::new(ParquetFile::open(data)?)
    }

    /// Wraps an already opened Parquet file.
    pub fn new(file: ParquetFile) -> Result<Self> {
        let raw = file
            .lookup(DYNAMIC_COLUMNS_KEY)
            .ok_or(Error::NoDynamicColumns)?;
        let dynamic_columns = DynamicColumns::deserialize(raw)
            .map_err(|e| Error::deserialize_dynamic_columns(raw, e))?;
        debug!(
            row_groups = file.num_row_groups(),
            dynamic_columns = %dynamic_columns,
            "opened serialized buffer"
        );
        Ok(Self {
            file,
            dynamic_columns,
        })
    }

    #[inline]
    pub fn parquet_file(&self) -> &ParquetFile {
        &self.file
    }

    #[inline]
    pub fn num_row_groups(&self) -> usize {
        self.file.num_row_groups()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.file.num_rows()
    }

    /// Returns the membership shared by every row group of the file.
    #[inline]
    pub fn dynamic_columns(&self) -> &DynamicColumns {
        &self.dynamic_columns
    }

    /// Returns a reader over row group `index`.
    pub fn dynamic_row_group(&self, index: usize) -> Result<RowGroupReader<'_>> {
        let count = self.num_row_groups();
        if index >= count {
            return Err(Error::RowGroupOutOfRange { index, count });
        }
        Ok(RowGroupReader::new(&self.file, index, &self.dynamic_columns))
    }

    /// Iterates over every row group in file order.
    pub fn dynamic_row_groups(&self) -> impl Iterator<Item = RowGroupReader<'_>> {
        (0..self.num_row_groups())
            .map(move |index| RowGroupReader::new(&self.file, index, &self.dynamic_columns))
    }
}
