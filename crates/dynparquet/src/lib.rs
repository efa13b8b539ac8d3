//! Strata Dynparquet - Parquet buffers with dynamic columns.
//!
//! A table schema may declare *dynamic column groups* (for example a
//! `labels` group) whose concrete members are only decided at write time.
//! Each Parquet file records the members it realized in a footer entry, and
//! readers reconcile files with differing membership against one schema.
//!
//! - `schema`: `DynamicSchema`, column definitions and batch reshaping
//! - `dynamic_columns`: the per-file membership mapping and its footer form
//! - `buffer`: `SerializedBuffer`, an opened file plus its membership
//! - `row_group`: `RowGroupReader` and its batch and row iterators
//! - `writer`: `BufferWriter`, producing buffers for tests and tools
//!
//! # Example
//!
//! ```rust
//! use strata_core::Value;
//! use strata_dynparquet::{BufferWriter, DynamicColumns, DynamicSchema, SerializedBuffer, WriterOptions};
//!
//! let schema = DynamicSchema::sample();
//! let labels = DynamicColumns::new().with_group("labels", ["node"]).unwrap();
//!
//! let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
//! writer
//!     .write_rows(&[vec![
//!         Value::from("cpu"),
//!         Value::from("node-1"),
//!         Value::from("main"),
//!         Value::Int64(1),
//!         Value::Int64(10),
//!     ]])
//!     .unwrap();
//!
//! let buffer = SerializedBuffer::from_bytes(writer.finish().unwrap()).unwrap();
//! let row_group = buffer.dynamic_row_group(0).unwrap();
//! let row = row_group.dynamic_rows().unwrap().next().unwrap().unwrap();
//! assert_eq!(row.get("labels.node"), Some(&Value::from("node-1")));
//! ```

mod buffer;
mod dynamic_columns;
mod file;
mod row_group;
mod schema;
mod writer;

pub use buffer::SerializedBuffer;
pub use dynamic_columns::{DynamicColumns, ParseDynamicColumnsError, DYNAMIC_COLUMNS_KEY};
pub use file::{ColumnStatistics, ParquetFile};
pub use row_group::{DynamicRow, DynamicRows, RowGroupBatches, RowGroupReader};
pub use schema::{
    conform_batch, dynamic_column_name, split_dynamic_column_name, ColumnDefinition,
    DynamicSchema, DynamicSchemaBuilder, DYNAMIC_SEPARATOR,
};
pub use writer::{BufferWriter, WriterOptions};
