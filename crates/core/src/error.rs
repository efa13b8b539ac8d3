//! Error types for the Strata query core.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed low-level error carried as the source of a wrapping variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The physical input is not a valid member of the storage format.
    MalformedInput,
    /// The plan could not be compiled against the schema in scope.
    PlanResolution,
    /// A failure while the compiled pipeline was running.
    Execution,
}

/// Error types for Strata operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The physical file carries no dynamic columns metadata entry.
    #[error("no dynamic columns metadata found, it must be present")]
    NoDynamicColumns,

    /// The dynamic columns metadata value could not be parsed.
    #[error("deserialize dynamic columns metadata {raw:?}: {source}")]
    DeserializeDynamicColumns {
        raw: String,
        #[source]
        source: BoxError,
    },

    /// Invalid schema definition or a physical buffer that does not fit it.
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    /// A column reference could not be resolved.
    #[error("Column {column} not found in {context}")]
    ColumnNotFound { column: String, context: String },

    /// A row group index past the end of a buffer.
    #[error("Row group {index} out of range, buffer has {count} row groups")]
    RowGroupOutOfRange { index: usize, count: usize },

    /// The table provider does not know the table.
    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    /// The aggregate expression of an Aggregate node has an invalid shape.
    #[error("Invalid aggregate expression {expr}: {message}")]
    InvalidAggregate { expr: String, message: String },

    /// A group-by expression is not a column reference.
    #[error("Invalid group by expression {expr}: only column references are allowed")]
    InvalidGroupBy { expr: String },

    /// An expression that cannot appear where it was used.
    #[error("Invalid expression {expr}: {message}")]
    InvalidExpression { expr: String, message: String },

    /// Operand types that cannot be combined.
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },

    /// An Arrow data type the core does not handle.
    #[error("Unsupported data type: {data_type}")]
    UnsupportedType { data_type: String },

    /// The caller's allocator refused a reservation.
    #[error("Memory limit exceeded: requested {requested} bytes with {allocated} of {limit} bytes allocated")]
    MemoryLimitExceeded {
        requested: usize,
        allocated: usize,
        limit: usize,
    },

    /// An integer aggregate left the range of its output type.
    #[error("Arithmetic overflow in {expr}")]
    ArithmeticOverflow { expr: String },

    /// Arrow error during columnar operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Parquet error while decoding a physical file.
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Internal error indicating a bug or unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoDynamicColumns
            | Error::DeserializeDynamicColumns { .. }
            | Error::InvalidSchema { .. }
            | Error::Parquet(_) => ErrorKind::MalformedInput,
            Error::ColumnNotFound { .. }
            | Error::TableNotFound { .. }
            | Error::InvalidAggregate { .. }
            | Error::InvalidGroupBy { .. }
            | Error::InvalidExpression { .. }
            | Error::TypeMismatch { .. } => ErrorKind::PlanResolution,
            Error::UnsupportedType { .. }
            | Error::MemoryLimitExceeded { .. }
            | Error::RowGroupOutOfRange { .. }
            | Error::ArithmeticOverflow { .. }
            | Error::Arrow(_)
            | Error::Internal(_) => ErrorKind::Execution,
        }
    }

    /// Creates a dynamic columns deserialization error.
    pub fn deserialize_dynamic_columns(
        raw: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::DeserializeDynamicColumns {
            raw: raw.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>, context: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an invalid aggregate error.
    pub fn invalid_aggregate(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidAggregate {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid group by error.
    pub fn invalid_group_by(expr: impl Into<String>) -> Self {
        Error::InvalidGroupBy { expr: expr.into() }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidExpression {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates an arithmetic overflow error.
    pub fn arithmetic_overflow(expr: impl Into<String>) -> Self {
        Error::ArithmeticOverflow { expr: expr.into() }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(data_type: &arrow::datatypes::DataType) -> Self {
        Error::UnsupportedType {
            data_type: data_type.to_string(),
        }
    }
}
