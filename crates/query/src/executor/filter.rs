//! Filter executor.

use crate::ast::Expr;
use crate::executor::{Operator, PhysicalExpr};
use crate::planner::PhysicalPlan;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use strata_core::{Error, Result};

/// Filter executor - keeps the rows for which a predicate is true.
///
/// Rows where the predicate evaluates to null are dropped.
pub struct FilterExec {
    input: Box<PhysicalPlan>,
    predicate: Expr,
    physical: PhysicalExpr,
}

impl FilterExec {
    /// Creates a new filter executor.
    pub fn try_new(input: PhysicalPlan, predicate: Expr) -> Result<Self> {
        let physical = PhysicalExpr::compile(&predicate, &input.schema(), "filter")?;
        if !matches!(physical.data_type(), DataType::Boolean | DataType::Null) {
            return Err(Error::type_mismatch(format!(
                "filter predicate {} is {}, not boolean",
                predicate,
                physical.data_type()
            )));
        }
        Ok(Self {
            input: Box::new(input),
            predicate,
            physical,
        })
    }

    pub(crate) fn input(&self) -> &PhysicalPlan {
        &self.input
    }
}

impl Operator for FilterExec {
    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        while let Some(batch) = self.input.next_batch()? {
            let batch = self.physical.filter(&batch)?;
            if batch.num_rows() > 0 {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("FilterExec: {}", self.predicate)
    }
}
