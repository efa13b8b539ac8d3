//! Compiled expressions evaluated over record batches.

use crate::ast::{BinaryOp, Expr};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Datum, Scalar};
use arrow::compute::kernels::boolean::{and_kleene, or_kleene};
use arrow::compute::kernels::cmp;
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use strata_core::{Error, Result, Value};

/// Result of evaluating an expression.
#[derive(Clone, Debug)]
pub enum ColumnarValue {
    Array(ArrayRef),
    Scalar(Value),
}

/// An expression bound to column positions of one schema.
#[derive(Clone, Debug)]
pub enum PhysicalExpr {
    Column {
        name: String,
        index: usize,
        data_type: DataType,
    },
    Literal(Value),
    Binary {
        left: Box<PhysicalExpr>,
        op: BinaryOp,
        right: Box<PhysicalExpr>,
        /// Type both comparison operands are coerced to.
        operand_type: DataType,
    },
}

impl PhysicalExpr {
    /// Binds `expr` to `schema`. `context` names the operator for errors.
    pub fn compile(expr: &Expr, schema: &Schema, context: &str) -> Result<Self> {
        match expr {
            Expr::Column(name) => {
                let index = schema
                    .index_of(name)
                    .map_err(|_| Error::column_not_found(name.clone(), context))?;
                Ok(PhysicalExpr::Column {
                    name: name.clone(),
                    index,
                    data_type: schema.field(index).data_type().clone(),
                })
            }
            Expr::Literal(value) => Ok(PhysicalExpr::Literal(value.clone())),
            Expr::Alias { expr, .. } => PhysicalExpr::compile(expr, schema, context),
            Expr::BinaryExpr { left, op, right } => {
                let left = PhysicalExpr::compile(left, schema, context)?;
                let right = PhysicalExpr::compile(right, schema, context)?;
                let (lt, rt) = (left.data_type(), right.data_type());
                let operand_type = if op.is_comparison() {
                    common_type(&lt, &rt).ok_or_else(|| {
                        Error::type_mismatch(format!("cannot compare {} with {} in {}", lt, rt, expr))
                    })?
                } else {
                    for operand in [&lt, &rt] {
                        if !matches!(operand, DataType::Boolean | DataType::Null) {
                            return Err(Error::type_mismatch(format!(
                                "{} operands must be boolean, got {} in {}",
                                op, operand, expr
                            )));
                        }
                    }
                    DataType::Boolean
                };
                Ok(PhysicalExpr::Binary {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                    operand_type,
                })
            }
            Expr::DynamicColumn(_) => Err(Error::invalid_expression(
                expr.to_string(),
                "a dynamic column group cannot be evaluated as a value",
            )),
            Expr::AggregateFunction { .. } => Err(Error::invalid_expression(
                expr.to_string(),
                "aggregate functions are only allowed as the aggregate of an Aggregate",
            )),
        }
    }

    /// Returns the type this expression evaluates to.
    pub fn data_type(&self) -> DataType {
        match self {
            PhysicalExpr::Column { data_type, .. } => data_type.clone(),
            PhysicalExpr::Literal(value) => value.data_type().unwrap_or(DataType::Null),
            PhysicalExpr::Binary { .. } => DataType::Boolean,
        }
    }

    /// Evaluates the expression over `batch`.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<ColumnarValue> {
        match self {
            PhysicalExpr::Column { index, .. } => Ok(ColumnarValue::Array(batch.column(*index).clone())),
            PhysicalExpr::Literal(value) => Ok(ColumnarValue::Scalar(value.clone())),
            PhysicalExpr::Binary {
                left,
                op,
                right,
                operand_type,
            } => {
                let left = left.evaluate(batch)?;
                let right = right.evaluate(batch)?;
                if op.is_comparison() {
                    compare(left, *op, right, operand_type)
                } else {
                    let num_rows = batch.num_rows();
                    let left = left.into_boolean(num_rows)?;
                    let right = right.into_boolean(num_rows)?;
                    let result = match op {
                        BinaryOp::And => and_kleene(&left, &right)?,
                        _ => or_kleene(&left, &right)?,
                    };
                    Ok(ColumnarValue::Array(Arc::new(result)))
                }
            }
        }
    }

    /// Evaluates a predicate to a selection mask. Null means not selected.
    pub fn evaluate_predicate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        self.evaluate(batch)?.into_boolean(batch.num_rows())
    }

    /// Keeps the rows of `batch` for which this predicate is true.
    pub fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.evaluate_predicate(batch)?;
        Ok(filter_record_batch(batch, &mask)?)
    }
}

impl fmt::Display for PhysicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalExpr::Column { name, index, .. } => write!(f, "{}@{}", name, index),
            PhysicalExpr::Literal(value) => write!(f, "{}", value),
            PhysicalExpr::Binary {
                left, op, right, ..
            } => write!(f, "({} {} {})", left, op, right),
        }
    }
}

impl ColumnarValue {
    /// Materializes the value as an array of `num_rows` rows.
    pub fn into_array(self, data_type: &DataType, num_rows: usize) -> Result<ArrayRef> {
        match self {
            ColumnarValue::Array(array) => Ok(array),
            ColumnarValue::Scalar(value) => value.to_array(data_type, num_rows),
        }
    }

    fn into_boolean(self, num_rows: usize) -> Result<BooleanArray> {
        match self {
            ColumnarValue::Array(array) => match array.as_boolean_opt() {
                Some(mask) => Ok(mask.clone()),
                None if array.data_type() == &DataType::Null => Ok(BooleanArray::new_null(array.len())),
                None => Err(Error::type_mismatch(format!(
                    "expected a boolean result, got {}",
                    array.data_type()
                ))),
            },
            ColumnarValue::Scalar(Value::Boolean(b)) => Ok(BooleanArray::from(vec![b; num_rows])),
            ColumnarValue::Scalar(Value::Null) => Ok(BooleanArray::new_null(num_rows)),
            ColumnarValue::Scalar(other) => Err(Error::type_mismatch(format!(
                "expected a boolean result, got {}",
                other
            ))),
        }
    }
}

/// Resolves a column reference to schema positions.
///
/// A static column resolves to one position, a dynamic group to every
/// member present in `schema`. Returns `None` for anything that is not a
/// column reference.
pub(crate) fn resolve_columns(expr: &Expr, schema: &Schema, context: &str) -> Result<Option<Vec<usize>>> {
    match expr {
        Expr::Column(name) => schema
            .index_of(name)
            .map(|index| Some(vec![index]))
            .map_err(|_| Error::column_not_found(name.clone(), context)),
        Expr::DynamicColumn(group) => {
            let matcher = crate::ast::ColumnMatcher::DynamicGroup(group.clone());
            Ok(Some(
                schema
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| matcher.matches(f.name()))
                    .map(|(i, _)| i)
                    .collect(),
            ))
        }
        _ => Ok(None),
    }
}

/// Returns the type two comparison operands are coerced to, if comparable.
pub(crate) fn common_type(left: &DataType, right: &DataType) -> Option<DataType> {
    use DataType::*;
    match (left, right) {
        (l, r) if l == r => Some(l.clone()),
        (Null, other) | (other, Null) => Some(other.clone()),
        (Int32, Int64) | (Int64, Int32) => Some(Int64),
        (Float64, Int32 | Int64) | (Int32 | Int64, Float64) => Some(Float64),
        _ => None,
    }
}

fn compare(
    left: ColumnarValue,
    op: BinaryOp,
    right: ColumnarValue,
    operand_type: &DataType,
) -> Result<ColumnarValue> {
    if operand_type == &DataType::Null {
        return Ok(ColumnarValue::Scalar(Value::Null));
    }
    match (left, right) {
        (ColumnarValue::Scalar(l), ColumnarValue::Scalar(r)) => {
            Ok(ColumnarValue::Scalar(compare_values(&l, op, &r)))
        }
        (ColumnarValue::Array(l), ColumnarValue::Scalar(r)) => {
            let l = coerce(l, operand_type)?;
            let r = Scalar::new(r.to_array(operand_type, 1)?);
            Ok(ColumnarValue::Array(Arc::new(apply(&l, op, &r)?)))
        }
        (ColumnarValue::Scalar(l), ColumnarValue::Array(r)) => {
            let l = Scalar::new(l.to_array(operand_type, 1)?);
            let r = coerce(r, operand_type)?;
            Ok(ColumnarValue::Array(Arc::new(apply(&l, op, &r)?)))
        }
        (ColumnarValue::Array(l), ColumnarValue::Array(r)) => {
            let l = coerce(l, operand_type)?;
            let r = coerce(r, operand_type)?;
            Ok(ColumnarValue::Array(Arc::new(apply(&l, op, &r)?)))
        }
    }
}

fn coerce(array: ArrayRef, data_type: &DataType) -> Result<ArrayRef> {
    if array.data_type() == data_type {
        Ok(array)
    } else {
        Ok(cast(&array, data_type)?)
    }
}

fn apply(left: &dyn Datum, op: BinaryOp, right: &dyn Datum) -> Result<BooleanArray> {
    let result = match op {
        BinaryOp::Eq => cmp::eq(left, right)?,
        BinaryOp::Ne => cmp::neq(left, right)?,
        BinaryOp::Lt => cmp::lt(left, right)?,
        BinaryOp::Le => cmp::lt_eq(left, right)?,
        BinaryOp::Gt => cmp::gt(left, right)?,
        BinaryOp::Ge => cmp::gt_eq(left, right)?,
        BinaryOp::And | BinaryOp::Or => {
            return Err(Error::Internal(format!("{} is not a comparison", op)))
        }
    };
    Ok(result)
}

/// Compares two scalars with numeric coercion. Null operands give null.
pub(crate) fn compare_values(left: &Value, op: BinaryOp, right: &Value) -> Value {
    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Value::Null,
        (Value::Int64(l), Value::Float64(r)) => (*l as f64).partial_cmp(r),
        (Value::Float64(l), Value::Int64(r)) => l.partial_cmp(&(*r as f64)),
        (Value::Float64(l), Value::Float64(r)) => l.partial_cmp(r),
        (l, r) if l.same_type(r) => Some(l.cmp(r)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Value::Null;
    };
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        BinaryOp::And | BinaryOp::Or => return Value::Null,
    };
    Value::Boolean(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, dyn_col, lit, sum};
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Field;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("labels.test", DataType::Utf8, true),
            Field::new("value", DataType::Int64, false),
            Field::new("ratio", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("abc"), None, Some("def")])),
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Float64Array::from(vec![Some(0.5), Some(2.5), None])),
            ],
        )
        .unwrap()
    }

    fn mask(expr: &Expr) -> Vec<Option<bool>> {
        let batch = batch();
        let compiled = PhysicalExpr::compile(expr, &batch.schema(), "test").unwrap();
        compiled.evaluate_predicate(&batch).unwrap().iter().collect()
    }

    #[test]
    fn test_null_comparison_is_null() {
        assert_eq!(
            mask(&col("labels.test").eq(lit("abc"))),
            vec![Some(true), None, Some(false)]
        );
        assert_eq!(
            mask(&col("value").eq(lit(Value::Null))),
            vec![None, None, None]
        );
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(
            mask(&col("value").gt(lit(1.5))),
            vec![Some(false), Some(true), Some(true)]
        );
        assert_eq!(
            mask(&col("ratio").lt(col("value"))),
            vec![Some(true), Some(false), None]
        );
    }

    #[test]
    fn test_kleene_logic() {
        let expr = col("labels.test")
            .eq(lit("abc"))
            .or(col("value").gt_eq(lit(3i64)));
        assert_eq!(mask(&expr), vec![Some(true), None, Some(true)]);
        let expr = col("labels.test").eq(lit("x")).and(col("value").gt(lit(0i64)));
        assert_eq!(mask(&expr), vec![Some(false), None, Some(false)]);
    }

    #[test]
    fn test_scalar_only_predicate() {
        assert_eq!(mask(&lit(1i64).lt(lit(2i64))), vec![Some(true); 3]);
    }

    #[test]
    fn test_filter_drops_null_rows() {
        let batch = batch();
        let expr = PhysicalExpr::compile(&col("labels.test").not_eq(lit("def")), &batch.schema(), "test")
            .unwrap();
        let filtered = expr.filter(&batch).unwrap();
        assert_eq!(filtered.num_rows(), 1);
    }

    #[test]
    fn test_compile_errors() {
        let schema = batch().schema();
        let err = PhysicalExpr::compile(&col("labels.other").eq(lit("a")), &schema, "filter").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
        let err = PhysicalExpr::compile(&col("value").eq(lit("a")), &schema, "filter").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let err = PhysicalExpr::compile(&col("value").and(lit(true)), &schema, "filter").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let err = PhysicalExpr::compile(&sum(col("value")), &schema, "filter").unwrap_err();
        assert!(matches!(err, Error::InvalidExpression { .. }));
        let err = PhysicalExpr::compile(&dyn_col("labels"), &schema, "filter").unwrap_err();
        assert!(matches!(err, Error::InvalidExpression { .. }));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&Value::Int64(1), BinaryOp::Lt, &Value::Float64(1.5)), Value::Boolean(true));
        assert_eq!(compare_values(&Value::Null, BinaryOp::Eq, &Value::Null), Value::Null);
        assert_eq!(compare_values(&Value::from("a"), BinaryOp::Ne, &Value::from("b")), Value::Boolean(true));
    }
}
