//! Scalar value type.
//!
//! `Value` is the row-oriented view of a single cell: it is what literals in
//! query expressions hold, what group keys are made of, and what
//! `DynamicRows` yields. Conversions to and from Arrow arrays live here so
//! every crate agrees on how a cell maps onto a column.

use crate::error::{Error, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int32Array, Int64Array,
    NullArray, StringArray,
};
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value that can be stored in a column cell.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the Arrow data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::Utf8),
            Value::Bytes(_) => Some(DataType::Binary),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns a reference to the bytes if this is Bytes, None otherwise.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns true if both values are of the same variant.
    pub fn same_type(&self, other: &Value) -> bool {
        self.type_order() == other.type_order()
    }

    /// Reads the cell at `row` of an Arrow array.
    pub fn from_array(array: &dyn Array, row: usize) -> Result<Value> {
        if array.is_null(row) {
            return Ok(Value::Null);
        }
        let value = match array.data_type() {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
            DataType::Int32 => Value::Int64(array.as_primitive::<Int32Type>().value(row) as i64),
            DataType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
            DataType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
            DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
            DataType::Binary => Value::Bytes(array.as_binary::<i32>().value(row).to_vec()),
            other => return Err(Error::unsupported_type(other)),
        };
        Ok(value)
    }

    /// Builds an Arrow array of `data_type` from a slice of values.
    ///
    /// Int64 values are accepted for Float64 columns; any other variant that
    /// does not match the column type is a type mismatch.
    pub fn build_array(values: &[Value], data_type: &DataType) -> Result<ArrayRef> {
        let array: ArrayRef = match data_type {
            DataType::Null => Arc::new(NullArray::new(values.len())),
            DataType::Boolean => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Boolean(b) => Ok(Some(*b)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(BooleanArray::from(items))
            }
            DataType::Int32 => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int64(i) => i32::try_from(*i)
                            .map(Some)
                            .map_err(|_| mismatch(v, data_type)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Int32Array::from(items))
            }
            DataType::Int64 => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int64(i) => Ok(Some(*i)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Int64Array::from(items))
            }
            DataType::Float64 => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Float64(f) => Ok(Some(*f)),
                        Value::Int64(i) => Ok(Some(*i as f64)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Float64Array::from(items))
            }
            DataType::Utf8 => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::String(s) => Ok(Some(s.as_str())),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(StringArray::from(items))
            }
            DataType::Binary => {
                let items = values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Bytes(b) => Ok(Some(b.as_slice())),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(BinaryArray::from(items))
            }
            other => return Err(Error::unsupported_type(other)),
        };
        Ok(array)
    }

    /// Builds an array of `len` copies of this value.
    pub fn to_array(&self, data_type: &DataType, len: usize) -> Result<ArrayRef> {
        Value::build_array(&vec![self.clone(); len], data_type)
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int64(_) => 2,
            Value::Float64(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
        }
    }
}

fn mismatch(value: &Value, data_type: &DataType) -> Error {
    Error::type_mismatch(format!("value {} does not fit a {} column", value, data_type))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => {
                // NaN groups with NaN
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => {
                if f.is_nan() {
                    f64::NAN.to_bits().hash(state)
                } else if *f == 0.0 {
                    0.0f64.to_bits().hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Int64(a), Value::Float64(b)) => {
                if b.is_nan() {
                    Ordering::Less
                } else {
                    (*a as f64)
                        .partial_cmp(b)
                        .unwrap_or(Ordering::Equal)
                        .then(Ordering::Less)
                }
            }
            (Value::Float64(a), Value::Int64(b)) => {
                if a.is_nan() {
                    Ordering::Greater
                } else {
                    a.partial_cmp(&(*b as f64))
                        .unwrap_or(Ordering::Equal)
                        .then(Ordering::Greater)
                }
            }
            (Value::Float64(a), Value::Float64(b)) => {
                // NaN sorts after every other float
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "0x{}", b.iter().map(|x| format!("{:02x}", x)).collect::<String>()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
