//! Integration tests for serialized buffers.
//!
//! These tests write real Parquet files in memory and read them back through
//! `SerializedBuffer` and `RowGroupReader`.

use arrow::array::{Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use strata_core::{Error, ErrorKind, Value};
use strata_dynparquet::{
    BufferWriter, DynamicColumns, DynamicSchema, SerializedBuffer, WriterOptions,
};

/// Helper to build a sample row: example_type, labels..., stacktrace, timestamp, value.
fn sample_row(labels: &[Option<&str>], stacktrace: &str, timestamp: i64, value: i64) -> Vec<Value> {
    let mut row = vec![Value::from("cpu")];
    row.extend(labels.iter().map(|l| Value::from(*l)));
    row.push(Value::from(stacktrace));
    row.push(Value::Int64(timestamp));
    row.push(Value::Int64(value));
    row
}

/// Helper to write a buffer of the sample schema.
fn write_buffer(members: &[&str], row_groups: &[Vec<Vec<Value>>]) -> Bytes {
    let schema = DynamicSchema::sample();
    let columns = DynamicColumns::new()
        .with_group("labels", members.iter().copied())
        .unwrap();
    let mut writer = BufferWriter::try_new(&schema, &columns, WriterOptions::default()).unwrap();
    for rows in row_groups {
        writer.write_rows(rows).unwrap();
        writer.flush().unwrap();
    }
    writer.finish().unwrap()
}

/// Helper to write a plain Parquet file with optional footer metadata.
fn write_plain_parquet(metadata: Option<Vec<KeyValue>>) -> Bytes {
    let schema = Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![1, 2]))])
        .unwrap();
    let props = WriterProperties::builder()
        .set_key_value_metadata(metadata)
        .build();
    let mut writer = ArrowWriter::try_new(Vec::new(), schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    Bytes::from(writer.into_inner().unwrap())
}

#[test]
fn test_dynamic_columns_round_trip() {
    let bytes = write_buffer(
        &["zone", "node"],
        &[vec![sample_row(&[Some("a"), Some("n1")], "main", 1, 1)]],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();

    let expected = DynamicColumns::new()
        .with_group("labels", ["zone", "node"])
        .unwrap();
    assert_eq!(buffer.dynamic_columns(), &expected);
    assert_eq!(buffer.dynamic_columns().get("labels").unwrap(), ["zone", "node"]);
}

#[test]
fn test_missing_metadata_is_rejected() {
    let err = SerializedBuffer::from_bytes(write_plain_parquet(None)).unwrap_err();
    assert!(matches!(err, Error::NoDynamicColumns));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn test_malformed_metadata_keeps_raw_value() {
    let bytes = write_plain_parquet(Some(vec![KeyValue::new(
        "dynamic_columns".to_string(),
        "labels".to_string(),
    )]));
    let err = SerializedBuffer::from_bytes(bytes).unwrap_err();
    match &err {
        Error::DeserializeDynamicColumns { raw, .. } => assert_eq!(raw, "labels"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert!(err.to_string().contains("\"labels\""));
}

#[test]
fn test_row_groups_share_buffer_membership() {
    let bytes = write_buffer(
        &["test"],
        &[
            vec![sample_row(&[Some("abc")], "a", 1, 1)],
            vec![
                sample_row(&[Some("def")], "b", 2, 2),
                sample_row(&[None], "c", 3, 3),
            ],
        ],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    assert_eq!(buffer.num_row_groups(), 2);

    let first = buffer.dynamic_row_group(0).unwrap();
    let second = buffer.dynamic_row_group(1).unwrap();
    assert_eq!(first.num_rows(), 1);
    assert_eq!(second.num_rows(), 2);
    assert!(std::ptr::eq(first.dynamic_columns(), buffer.dynamic_columns()));
    assert!(second.has_column("labels.test"));

    let err = buffer.dynamic_row_group(2).unwrap_err();
    assert!(matches!(err, Error::RowGroupOutOfRange { index: 2, count: 2 }));
}

#[test]
fn test_dynamic_rows_is_restartable() {
    let bytes = write_buffer(
        &["test"],
        &[vec![
            sample_row(&[Some("abc")], "a", 1, 10),
            sample_row(&[Some("def")], "b", 2, 20),
        ]],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let row_group = buffer.dynamic_row_group(0).unwrap();

    let first: Vec<_> = row_group.dynamic_rows().unwrap().map(|r| r.unwrap()).collect();
    let second: Vec<_> = row_group.dynamic_rows().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first[1].get("value"), Some(&Value::Int64(20)));
    assert_eq!(first[0].get("labels.test"), Some(&Value::from("abc")));
}

#[test]
fn test_reconciled_rows_fill_absent_members() {
    let bytes = write_buffer(&["other"], &[vec![sample_row(&[Some("x")], "a", 1, 1)]]);
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let row_group = buffer.dynamic_row_group(0).unwrap();

    let superset = DynamicColumns::new()
        .with_group("labels", ["other", "test"])
        .unwrap();
    let rows: Vec<_> = row_group
        .reconciled_rows(&DynamicSchema::sample(), &superset)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values().len(), 6);
    assert_eq!(rows[0].get("labels.other"), Some(&Value::from("x")));
    assert_eq!(rows[0].get("labels.test"), Some(&Value::Null));
}

#[test]
fn test_row_group_override() {
    let bytes = write_buffer(
        &["a", "b"],
        &[vec![sample_row(&[Some("1"), None], "s", 1, 1)]],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let only_a = DynamicColumns::new().with_group("labels", ["a"]).unwrap();
    let row_group = buffer
        .dynamic_row_group(0)
        .unwrap()
        .with_dynamic_columns(&only_a);

    assert!(row_group.has_column("labels.a"));
    assert!(!row_group.has_column("labels.b"));
    assert_eq!(
        row_group.column_names(),
        ["example_type", "labels.a", "stacktrace", "timestamp", "value"]
    );
}

#[test]
fn test_batches_conform_to_target() {
    let bytes = write_buffer(
        &["test"],
        &[vec![
            sample_row(&[Some("abc")], "a", 1, 10),
            sample_row(&[Some("def")], "b", 2, 20),
            sample_row(&[Some("ghi")], "c", 3, 30),
        ]],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let row_group = buffer.dynamic_row_group(0).unwrap();

    let target = Arc::new(Schema::new(vec![
        Field::new("value", DataType::Int64, false),
        Field::new("labels.missing", DataType::Utf8, true),
        Field::new("labels.test", DataType::Utf8, true),
    ]));
    let batches: Vec<_> = row_group
        .batches(&target, 2)
        .unwrap()
        .map(|b| b.unwrap())
        .collect();

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].num_rows(), 2);
    assert_eq!(batches[1].num_rows(), 1);
    assert_eq!(batches[0].schema(), target);
    assert_eq!(batches[0].column(1).null_count(), 2);
    let labels = batches[1]
        .column(2)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(labels.value(0), "ghi");
}

#[test]
fn test_batches_of_only_absent_columns() {
    let bytes = write_buffer(&[], &[vec![sample_row(&[], "a", 1, 1), sample_row(&[], "b", 2, 2)]]);
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let row_group = buffer.dynamic_row_group(0).unwrap();

    let target = Arc::new(Schema::new(vec![Field::new("labels.test", DataType::Utf8, true)]));
    let batches: Vec<_> = row_group
        .batches(&target, 8192)
        .unwrap()
        .map(|b| b.unwrap())
        .collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].num_rows(), 2);
    assert_eq!(batches[0].column(0).null_count(), 2);
}

#[test]
fn test_column_statistics() {
    let bytes = write_buffer(
        &["test"],
        &[vec![
            sample_row(&[Some("b")], "x", 1, 7),
            sample_row(&[Some("a")], "y", 2, -3),
            sample_row(&[None], "z", 3, 12),
        ]],
    );
    let buffer = SerializedBuffer::from_bytes(bytes).unwrap();
    let row_group = buffer.dynamic_row_group(0).unwrap();

    let value = row_group.column_statistics("value").unwrap();
    assert_eq!(value.min, Some(Value::Int64(-3)));
    assert_eq!(value.max, Some(Value::Int64(12)));

    let labels = row_group.column_statistics("labels.test").unwrap();
    assert_eq!(labels.min, Some(Value::from("a")));
    assert_eq!(labels.max, Some(Value::from("b")));
    assert_eq!(labels.null_count, Some(1));

    assert!(row_group.column_statistics("labels.other").is_none());
}
