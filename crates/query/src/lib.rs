//! Strata Query - Query engine over dynamic-column Parquet buffers.
//!
//! This crate provides the query pipeline:
//!
//! - `ast`: Column, literal, comparison and aggregate expressions
//! - `planner`: Logical plans, the plan builder and physical plan compilation
//! - `optimizer`: Projection, filter and distinct pushdown into the scan
//! - `executor`: Pull-based batch operators (scan, filter, project, aggregate, distinct)
//! - `provider`: Table resolution
//! - `engine`: Query entry point tying planning, optimization and execution together
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{DefaultAllocator, Error, Value};
//! use strata_dynparquet::{BufferWriter, DynamicColumns, DynamicSchema, WriterOptions};
//! use strata_query::ast::{col, lit, sum};
//! use strata_query::engine::Engine;
//! use strata_query::provider::{MemTable, MemTableProvider};
//!
//! let schema = DynamicSchema::sample();
//! let labels = DynamicColumns::new().with_group("labels", ["test"]).unwrap();
//! let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
//! writer
//!     .write_rows(&[vec![
//!         Value::from("cpu"),
//!         Value::from("abc"),
//!         Value::from("main"),
//!         Value::Int64(1),
//!         Value::Int64(3),
//!     ]])
//!     .unwrap();
//!
//! let table = MemTable::new("stacktraces", schema)
//!     .with_bytes(writer.finish().unwrap())
//!     .unwrap();
//! let provider = MemTableProvider::new().with_table(table);
//! let engine = Engine::new(Arc::new(DefaultAllocator::new()), Arc::new(provider));
//!
//! let mut rows = 0;
//! engine
//!     .scan_table("stacktraces")
//!     .filter(col("labels.test").eq(lit("abc")))
//!     .aggregate(sum(col("value")).alias("value_sum"), vec![col("stacktrace")])
//!     .project(vec![col("stacktrace"), col("value_sum")])
//!     .execute::<_, Error>(|batch| {
//!         rows += batch.num_rows();
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(rows, 1);
//! ```

pub mod ast;
pub mod config;
pub mod engine;
pub mod executor;
pub mod optimizer;
pub mod planner;
pub mod provider;

pub use engine::{Engine, ExplainResult, QueryBuilder};
