//! Operator trait for query execution.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use strata_core::Result;

/// A pull-based query operator producing record batches.
pub trait Operator {
    /// Returns the schema of every batch this operator produces.
    fn schema(&self) -> SchemaRef;

    /// Produces the next batch, or `None` once the operator is exhausted.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// One-line description used in plan output.
    fn describe(&self) -> String;
}
