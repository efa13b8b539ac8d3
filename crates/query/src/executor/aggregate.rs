//! Hash aggregate executor.

use crate::ast::{AggregateFunc, Expr};
use crate::executor::expr::resolve_columns;
use crate::executor::Operator;
use crate::planner::PhysicalPlan;
use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use hashbrown::HashMap;
use std::mem::size_of;
use std::sync::Arc;
use strata_core::{Error, Reservation, Result, Value};
use tracing::debug;

/// Running state of one aggregate function for one group.
#[derive(Clone, Debug, PartialEq)]
enum Accumulator {
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Count(i64),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: f64, count: i64 },
}

impl Accumulator {
    fn new(func: AggregateFunc, input_type: &DataType) -> Self {
        match func {
            AggregateFunc::Sum if input_type == &DataType::Float64 => Accumulator::SumFloat(None),
            AggregateFunc::Sum => Accumulator::SumInt(None),
            AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Min => Accumulator::Min(None),
            AggregateFunc::Max => Accumulator::Max(None),
            AggregateFunc::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
        }
    }

    /// Folds one input value in. Nulls are ignored.
    ///
    /// Returns false if an integer sum overflows; the state is left as it
    /// was before the value.
    fn update(&mut self, value: Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Accumulator::SumInt(sum) => {
                if let Some(v) = value.as_i64() {
                    match sum.unwrap_or(0).checked_add(v) {
                        Some(total) => *sum = Some(total),
                        None => return false,
                    }
                }
            }
            Accumulator::SumFloat(sum) => {
                if let Some(v) = value.as_f64() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            Accumulator::Count(count) => *count += 1,
            Accumulator::Min(min) => {
                if min.as_ref().map_or(true, |m| value < *m) {
                    *min = Some(value);
                }
            }
            Accumulator::Max(max) => {
                if max.as_ref().map_or(true, |m| value > *m) {
                    *max = Some(value);
                }
            }
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
        }
        true
    }

    fn finish(&self) -> Value {
        match self {
            Accumulator::SumInt(sum) => sum.map(Value::Int64).unwrap_or(Value::Null),
            Accumulator::SumFloat(sum) => sum.map(Value::Float64).unwrap_or(Value::Null),
            Accumulator::Count(count) => Value::Int64(*count),
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*sum / *count as f64)
                }
            }
        }
    }
}

fn is_numeric(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Int32 | DataType::Int64 | DataType::Float64)
}

fn output_type(func: AggregateFunc, input_type: &DataType) -> DataType {
    match func {
        AggregateFunc::Sum if input_type == &DataType::Float64 => DataType::Float64,
        AggregateFunc::Sum | AggregateFunc::Count => DataType::Int64,
        AggregateFunc::Avg => DataType::Float64,
        AggregateFunc::Min | AggregateFunc::Max => input_type.clone(),
    }
}

fn value_size(value: &Value) -> usize {
    size_of::<Value>()
        + match value {
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            _ => 0,
        }
}

/// Hash aggregate executor - computes one aggregate per group.
///
/// The whole input is consumed before the first batch is produced. Groups
/// are emitted in the order they were first seen.
pub struct HashAggregateExec {
    input: Box<PhysicalPlan>,
    aggregate: Expr,
    group_by: Vec<Expr>,
    group_indices: Vec<usize>,
    func: AggregateFunc,
    aggregate_index: usize,
    aggregate_input_type: DataType,
    schema: SchemaRef,
    batch_size: usize,
    reservation: Reservation,
    group_map: HashMap<Vec<Value>, usize>,
    keys: Vec<Vec<Value>>,
    accumulators: Vec<Accumulator>,
    consumed: bool,
    emit_offset: usize,
}

impl HashAggregateExec {
    /// Creates a new aggregate executor.
    ///
    /// `aggregate` must be an aggregate function over a column, optionally
    /// aliased. Each group-by expression must be a column or a dynamic
    /// group.
    pub fn try_new(
        input: PhysicalPlan,
        aggregate: Expr,
        group_by: Vec<Expr>,
        batch_size: usize,
        reservation: Reservation,
    ) -> Result<Self> {
        let input_schema = input.schema();

        let mut group_indices = Vec::new();
        for expr in &group_by {
            let indices = resolve_columns(expr, &input_schema, "aggregate group by")?
                .ok_or_else(|| Error::invalid_group_by(expr.to_string()))?;
            for index in indices {
                if !group_indices.contains(&index) {
                    group_indices.push(index);
                }
            }
        }

        let (func, argument) = match aggregate.unalias() {
            Expr::AggregateFunction { func, expr } => (*func, expr.unalias()),
            _ => {
                return Err(Error::invalid_aggregate(
                    aggregate.to_string(),
                    "expected an aggregate function",
                ))
            }
        };
        let Expr::Column(column) = argument else {
            return Err(Error::invalid_aggregate(
                aggregate.to_string(),
                "aggregate functions take a single column",
            ));
        };
        let aggregate_index = input_schema
            .index_of(column)
            .map_err(|_| Error::column_not_found(column.clone(), "aggregate"))?;
        let aggregate_input_type = input_schema.field(aggregate_index).data_type().clone();
        if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg) && !is_numeric(&aggregate_input_type) {
            return Err(Error::invalid_aggregate(
                aggregate.to_string(),
                format!("{} requires a numeric column, {} is {}", func, column, aggregate_input_type),
            ));
        }

        let mut fields: Vec<Field> = group_indices
            .iter()
            .map(|&i| input_schema.field(i).clone())
            .collect();
        fields.push(Field::new(
            aggregate.name(),
            output_type(func, &aggregate_input_type),
            func != AggregateFunc::Count,
        ));

        Ok(Self {
            input: Box::new(input),
            aggregate,
            group_by,
            group_indices,
            func,
            aggregate_index,
            aggregate_input_type,
            schema: Arc::new(Schema::new(fields)),
            batch_size: batch_size.max(1),
            reservation,
            group_map: HashMap::new(),
            keys: Vec::new(),
            accumulators: Vec::new(),
            consumed: false,
            emit_offset: 0,
        })
    }

    pub(crate) fn input(&self) -> &PhysicalPlan {
        &self.input
    }

    fn consume(&mut self) -> Result<()> {
        let mut rows = 0;
        while let Some(batch) = self.input.next_batch()? {
            rows += batch.num_rows();
            self.update_batch(&batch)?;
        }
        if self.keys.is_empty() && self.group_by.is_empty() {
            self.keys.push(Vec::new());
            self.accumulators
                .push(Accumulator::new(self.func, &self.aggregate_input_type));
        }
        debug!(
            aggregate = %self.aggregate,
            input_rows = rows,
            groups = self.keys.len(),
            memory = self.reservation.size(),
            "aggregate input consumed"
        );
        Ok(())
    }

    fn update_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let values = batch.column(self.aggregate_index);
        for row in 0..batch.num_rows() {
            let key = self
                .group_indices
                .iter()
                .map(|&i| Value::from_array(batch.column(i).as_ref(), row))
                .collect::<Result<Vec<_>>>()?;
            let group = match self.group_map.get(&key) {
                Some(&group) => group,
                None => {
                    let size = key.iter().map(value_size).sum::<usize>()
                        + size_of::<Accumulator>()
                        + size_of::<usize>();
                    self.reservation.try_grow(size)?;
                    let group = self.keys.len();
                    self.keys.push(key.clone());
                    self.accumulators
                        .push(Accumulator::new(self.func, &self.aggregate_input_type));
                    self.group_map.insert(key, group);
                    group
                }
            };
            let value = Value::from_array(values.as_ref(), row)?;
            if !self.accumulators[group].update(value) {
                return Err(Error::arithmetic_overflow(self.aggregate.to_string()));
            }
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<RecordBatch>> {
        if self.emit_offset >= self.keys.len() {
            self.reservation.free();
            return Ok(None);
        }
        let end = (self.emit_offset + self.batch_size).min(self.keys.len());
        let range = self.emit_offset..end;
        self.emit_offset = end;

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        let group_fields = self.schema.fields().iter().take(self.group_indices.len());
        for (position, field) in group_fields.enumerate() {
            let values: Vec<Value> = self.keys[range.clone()]
                .iter()
                .map(|key| key[position].clone())
                .collect();
            columns.push(Value::build_array(&values, field.data_type())?);
        }
        let results: Vec<Value> = self.accumulators[range.clone()]
            .iter()
            .map(Accumulator::finish)
            .collect();
        let aggregate_field = self.schema.field(self.group_indices.len());
        columns.push(Value::build_array(&results, aggregate_field.data_type())?);

        let options = RecordBatchOptions::new().with_row_count(Some(range.len()));
        Ok(Some(RecordBatch::try_new_with_options(
            self.schema.clone(),
            columns,
            &options,
        )?))
    }
}

impl Operator for HashAggregateExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if !self.consumed {
            self.consume()?;
            self.consumed = true;
        }
        self.emit()
    }

    fn describe(&self) -> String {
        let group_by: Vec<String> = self.group_by.iter().map(|e| e.to_string()).collect();
        format!(
            "HashAggregateExec: {} group_by=[{}]",
            self.aggregate,
            group_by.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulators_ignore_nulls() {
        let inputs = [Value::Int64(3), Value::Null, Value::Int64(1)];
        let run = |func| {
            let mut acc = Accumulator::new(func, &DataType::Int64);
            for v in inputs.iter().cloned() {
                assert!(acc.update(v));
            }
            acc.finish()
        };
        assert_eq!(run(AggregateFunc::Sum), Value::Int64(4));
        assert_eq!(run(AggregateFunc::Count), Value::Int64(2));
        assert_eq!(run(AggregateFunc::Min), Value::Int64(1));
        assert_eq!(run(AggregateFunc::Max), Value::Int64(3));
        assert_eq!(run(AggregateFunc::Avg), Value::Float64(2.0));
    }

    #[test]
    fn test_empty_accumulators() {
        for func in [AggregateFunc::Sum, AggregateFunc::Min, AggregateFunc::Max, AggregateFunc::Avg] {
            assert_eq!(Accumulator::new(func, &DataType::Float64).finish(), Value::Null);
        }
        assert_eq!(
            Accumulator::new(AggregateFunc::Count, &DataType::Utf8).finish(),
            Value::Int64(0)
        );
    }

    #[test]
    fn test_float_sum_and_string_bounds() {
        let mut sum = Accumulator::new(AggregateFunc::Sum, &DataType::Float64);
        sum.update(Value::Float64(0.5));
        sum.update(Value::Float64(1.25));
        assert_eq!(sum.finish(), Value::Float64(1.75));

        let mut max = Accumulator::new(AggregateFunc::Max, &DataType::Utf8);
        for s in ["b", "c", "a"] {
            max.update(Value::from(s));
        }
        assert_eq!(max.finish(), Value::from("c"));
    }

    #[test]
    fn test_integer_sum_overflow() {
        let mut sum = Accumulator::new(AggregateFunc::Sum, &DataType::Int64);
        assert!(sum.update(Value::Int64(i64::MAX)));
        assert!(!sum.update(Value::Int64(1)));
        assert_eq!(sum.finish(), Value::Int64(i64::MAX));

        let mut sum = Accumulator::new(AggregateFunc::Sum, &DataType::Int64);
        assert!(sum.update(Value::Int64(i64::MIN)));
        assert!(!sum.update(Value::Int64(-1)));
        assert!(sum.update(Value::Int64(1)));
        assert_eq!(sum.finish(), Value::Int64(i64::MIN + 1));
    }

    #[test]
    fn test_output_types() {
        assert_eq!(output_type(AggregateFunc::Sum, &DataType::Int32), DataType::Int64);
        assert_eq!(output_type(AggregateFunc::Sum, &DataType::Float64), DataType::Float64);
        assert_eq!(output_type(AggregateFunc::Avg, &DataType::Int64), DataType::Float64);
        assert_eq!(output_type(AggregateFunc::Max, &DataType::Utf8), DataType::Utf8);
    }
}
