//! Integration tests for query execution.
//!
//! Every test writes real Parquet buffers in memory, registers them in a
//! `MemTable` and runs queries end to end through the `Engine`.

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use strata_core::{Allocator, DefaultAllocator, Error, ErrorKind, LimitedAllocator, Value};
use strata_dynparquet::{BufferWriter, DynamicColumns, DynamicSchema, WriterOptions};
use strata_query::ast::{col, count, dyn_col, lit, max, sum};
use strata_query::config::{EngineConfig, ScanOptions};
use strata_query::engine::Engine;
use strata_query::provider::{MemTable, MemTableProvider};

/// Helper to write one buffer realizing a single `labels` member.
fn write_buffer(member: &str, rows: &[(Option<&str>, &str, i64)]) -> bytes::Bytes {
    let schema = DynamicSchema::sample();
    let labels = DynamicColumns::new().with_group("labels", [member]).unwrap();
    let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
    let rows: Vec<Vec<Value>> = rows
        .iter()
        .enumerate()
        .map(|(i, (label, stacktrace, value))| {
            vec![
                Value::from("cpu"),
                Value::from(*label),
                Value::from(*stacktrace),
                Value::Int64(i as i64),
                Value::Int64(*value),
            ]
        })
        .collect();
    writer.write_rows(&rows).unwrap();
    writer.finish().unwrap()
}

/// Helper to build the two-buffer table: the first buffer realizes
/// `labels.test`, the second `labels.other`.
fn sample_table() -> MemTable {
    let a = write_buffer(
        "test",
        &[
            (Some("abc"), "s1", 1),
            (Some("abc"), "s2", 2),
            (Some("xyz"), "s1", 4),
            (Some("abc"), "s1", 8),
        ],
    );
    let b = write_buffer("other", &[(Some("abc"), "s1", 16), (Some("q"), "s3", 32)]);
    MemTable::new("stacktraces", DynamicSchema::sample())
        .with_bytes(a)
        .unwrap()
        .with_bytes(b)
        .unwrap()
}

fn engine_with(config: EngineConfig) -> Engine {
    let provider = MemTableProvider::new().with_table(sample_table());
    Engine::new(Arc::new(DefaultAllocator::new()), Arc::new(provider)).with_config(config)
}

fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

/// Flattens batches into rows of values.
fn rows(batches: &[RecordBatch]) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            out.push(
                batch
                    .columns()
                    .iter()
                    .map(|c| Value::from_array(c.as_ref(), row).unwrap())
                    .collect(),
            );
        }
    }
    out
}

fn column_names(batches: &[RecordBatch]) -> Vec<String> {
    batches[0]
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

#[test]
fn test_sample_query() {
    let batches = engine()
        .scan_table("stacktraces")
        .filter(col("labels.test").eq(lit("abc")))
        .aggregate(sum(col("value")).alias("value_sum"), vec![col("stacktrace")])
        .project(vec![col("stacktrace"), col("value_sum")])
        .collect()
        .unwrap();

    assert_eq!(column_names(&batches), vec!["stacktrace", "value_sum"]);
    // Rows of the buffer without `labels.test` read it as null and drop out.
    assert_eq!(
        rows(&batches),
        vec![
            vec![Value::from("s1"), Value::Int64(9)],
            vec![Value::from("s2"), Value::Int64(2)],
        ]
    );
}

#[test]
fn test_optimized_matches_unoptimized() {
    let run = |optimize| {
        let batches = engine_with(EngineConfig::default().with_optimize(optimize))
            .scan_table("stacktraces")
            .filter(col("value").gt(lit(1i64)).and(col("labels.other").eq(lit("abc"))))
            .aggregate(max(col("value")).alias("m"), vec![col("stacktrace")])
            .collect()
            .unwrap();
        rows(&batches)
    };
    let optimized = run(true);
    assert_eq!(optimized, vec![vec![Value::from("s1"), Value::Int64(16)]]);
    assert_eq!(optimized, run(false));
}

#[test]
fn test_nan_row_group_is_not_pruned() {
    let schema = DynamicSchema::builder("ratios")
        .unwrap()
        .add_dynamic_column("labels", DataType::Utf8)
        .unwrap()
        .add_nullable_column("ratio", DataType::Float64)
        .unwrap()
        .build()
        .unwrap();
    let labels = DynamicColumns::new().with_group("labels", ["test"]).unwrap();
    let mut writer = BufferWriter::try_new(&schema, &labels, WriterOptions::default()).unwrap();
    writer
        .write_rows(&[
            vec![Value::from("abc"), Value::Float64(1.0)],
            vec![Value::from("abc"), Value::Float64(f64::NAN)],
        ])
        .unwrap();
    let table = MemTable::new("ratios", schema)
        .with_bytes(writer.finish().unwrap())
        .unwrap();
    let provider = Arc::new(MemTableProvider::new().with_table(table));

    let count = |optimize| {
        Engine::new(Arc::new(DefaultAllocator::new()), provider.clone())
            .with_config(EngineConfig::default().with_optimize(optimize))
            .scan_table("ratios")
            .filter(col("ratio").gt(lit(5.0)))
            .project(vec![col("ratio")])
            .collect()
            .unwrap()
            .iter()
            .map(|b| b.num_rows())
            .sum::<usize>()
    };
    assert_eq!(count(true), 1);
    assert_eq!(count(false), 1);
}

#[derive(Debug, PartialEq)]
enum CallbackError {
    Query(String),
    Stop(usize),
}

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        CallbackError::Query(err.to_string())
    }
}

#[test]
fn test_callback_error_stops_execution() {
    let config = EngineConfig::default().with_scan_options(ScanOptions::default().with_batch_size(1));
    let mut calls = 0;
    let result = engine_with(config)
        .scan_table("stacktraces")
        .project(vec![col("value")])
        .execute(|batch| {
            calls += 1;
            Err(CallbackError::Stop(batch.num_rows()))
        });
    assert_eq!(result, Err(CallbackError::Stop(1)));
    assert_eq!(calls, 1);
}

#[test]
fn test_schema_scan_distinct() {
    let batches = engine()
        .scan_schema("stacktraces")
        .distinct(vec![col("name")])
        .collect()
        .unwrap();
    let names: Vec<Value> = rows(&batches).into_iter().flatten().collect();
    assert_eq!(
        names,
        vec![
            Value::from("example_type"),
            Value::from("labels.test"),
            Value::from("stacktrace"),
            Value::from("timestamp"),
            Value::from("value"),
            Value::from("labels.other"),
        ]
    );
}

#[test]
fn test_distinct_dynamic_group() {
    let batches = engine()
        .scan_table("stacktraces")
        .distinct(vec![dyn_col("labels")])
        .collect()
        .unwrap();
    assert_eq!(column_names(&batches), vec!["labels.other", "labels.test"]);
    assert_eq!(
        rows(&batches),
        vec![
            vec![Value::Null, Value::from("abc")],
            vec![Value::Null, Value::from("xyz")],
            vec![Value::from("abc"), Value::Null],
            vec![Value::from("q"), Value::Null],
        ]
    );
}

#[test]
fn test_global_aggregate_of_empty_input() {
    let engine = engine();
    let empty = engine
        .scan_table("stacktraces")
        .filter(col("value").gt(lit(1000i64)));

    let counted = empty.aggregate(count(col("value")), vec![]).collect().unwrap();
    assert_eq!(column_names(&counted), vec!["count(value)"]);
    assert_eq!(rows(&counted), vec![vec![Value::Int64(0)]]);

    let summed = empty.aggregate(sum(col("value")), vec![]).collect().unwrap();
    assert_eq!(rows(&summed), vec![vec![Value::Null]]);
}

#[test]
fn test_computed_projection() {
    let batches = engine()
        .scan_table("stacktraces")
        .filter(col("stacktrace").eq(lit("s2")))
        .project(vec![col("value"), col("value").gt(lit(1i64)).alias("big")])
        .collect()
        .unwrap();
    assert_eq!(column_names(&batches), vec!["value", "big"]);
    assert_eq!(rows(&batches), vec![vec![Value::Int64(2), Value::Boolean(true)]]);
}

#[test]
fn test_missing_table() {
    let err = engine().scan_table("missing").collect().unwrap_err();
    assert!(matches!(err, Error::TableNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::PlanResolution);
}

#[test]
fn test_invalid_aggregate_shapes() {
    let engine = engine();
    let base = engine.scan_table("stacktraces");

    let err = base
        .aggregate(sum(col("value")), vec![col("value").gt(lit(1i64))])
        .collect()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidGroupBy { .. }));

    let err = base.aggregate(col("value"), vec![]).collect().unwrap_err();
    assert!(matches!(err, Error::InvalidAggregate { .. }));

    let err = base.aggregate(sum(col("stacktrace")), vec![]).collect().unwrap_err();
    assert!(matches!(err, Error::InvalidAggregate { .. }));
    assert_eq!(err.kind(), ErrorKind::PlanResolution);
}

#[test]
fn test_sum_overflow_is_an_error() {
    let bytes = write_buffer("test", &[(None, "s1", i64::MAX), (None, "s1", 1)]);
    let table = MemTable::new("stacktraces", DynamicSchema::sample())
        .with_bytes(bytes)
        .unwrap();
    let provider = MemTableProvider::new().with_table(table);
    let engine = Engine::new(Arc::new(DefaultAllocator::new()), Arc::new(provider));
    let err = engine
        .scan_table("stacktraces")
        .aggregate(sum(col("value")), vec![col("stacktrace")])
        .collect()
        .unwrap_err();
    assert!(matches!(err, Error::ArithmeticOverflow { ref expr } if expr == "sum(value)"));
    assert_eq!(err.kind(), ErrorKind::Execution);
}

#[test]
fn test_unknown_column() {
    let err = engine()
        .scan_table("stacktraces")
        .project(vec![col("nope")])
        .collect()
        .unwrap_err();
    assert!(matches!(err, Error::ColumnNotFound { ref column, .. } if column == "nope"));
}

#[test]
fn test_memory_limit() {
    let provider = MemTableProvider::new().with_table(sample_table());
    let engine = Engine::new(Arc::new(LimitedAllocator::new(16)), Arc::new(provider));
    let err = engine
        .scan_table("stacktraces")
        .collect()
        .unwrap_err();
    assert!(matches!(err, Error::MemoryLimitExceeded { limit: 16, .. }));
    assert_eq!(err.kind(), ErrorKind::Execution);
}

#[test]
fn test_allocator_is_released() {
    let allocator = Arc::new(DefaultAllocator::new());
    let provider = MemTableProvider::new().with_table(sample_table());
    let engine = Engine::new(allocator.clone(), Arc::new(provider));
    engine
        .scan_table("stacktraces")
        .distinct(vec![col("stacktrace")])
        .collect()
        .unwrap();
    assert_eq!(allocator.allocated(), 0);
}
