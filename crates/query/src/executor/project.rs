//! Projection executor.

use crate::ast::Expr;
use crate::executor::expr::resolve_columns;
use crate::executor::{Operator, PhysicalExpr};
use crate::planner::PhysicalPlan;
use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;
use strata_core::{Error, Result};

enum ProjectedColumn {
    /// An input column passed through, possibly renamed.
    Input(usize),
    Computed(PhysicalExpr),
}

/// Projection executor - computes the output columns.
///
/// A dynamic group expands to every member present in the input.
pub struct ProjectionExec {
    input: Box<PhysicalPlan>,
    exprs: Vec<Expr>,
    columns: Vec<ProjectedColumn>,
    schema: SchemaRef,
}

impl ProjectionExec {
    /// Creates a new projection executor.
    pub fn try_new(input: PhysicalPlan, exprs: Vec<Expr>) -> Result<Self> {
        let input_schema = input.schema();
        let mut columns = Vec::new();
        let mut fields = Vec::new();

        for expr in &exprs {
            let (inner, alias) = match expr {
                Expr::Alias { expr, name } => (expr.unalias(), Some(name.as_str())),
                other => (other, None),
            };
            match resolve_columns(inner, &input_schema, "projection")? {
                Some(indices) => {
                    if alias.is_some() && matches!(inner, Expr::DynamicColumn(_)) {
                        return Err(Error::invalid_expression(
                            expr.to_string(),
                            "a dynamic column group cannot be renamed",
                        ));
                    }
                    for index in indices {
                        let field = input_schema.field(index);
                        let field = match alias {
                            Some(name) => field.clone().with_name(name),
                            None => field.clone(),
                        };
                        fields.push(field);
                        columns.push(ProjectedColumn::Input(index));
                    }
                }
                None => {
                    let physical = PhysicalExpr::compile(inner, &input_schema, "projection")?;
                    fields.push(Field::new(expr.name(), physical.data_type(), true));
                    columns.push(ProjectedColumn::Computed(physical));
                }
            }
        }

        Ok(Self {
            input: Box::new(input),
            exprs,
            columns,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    pub(crate) fn input(&self) -> &PhysicalPlan {
        &self.input
    }

    fn project(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let num_rows = batch.num_rows();
        let arrays = self
            .columns
            .iter()
            .zip(self.schema.fields())
            .map(|(column, field)| match column {
                ProjectedColumn::Input(index) => Ok(batch.column(*index).clone()),
                ProjectedColumn::Computed(expr) => {
                    expr.evaluate(batch)?.into_array(field.data_type(), num_rows)
                }
            })
            .collect::<Result<Vec<ArrayRef>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        Ok(RecordBatch::try_new_with_options(
            self.schema.clone(),
            arrays,
            &options,
        )?)
    }
}

impl Operator for ProjectionExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        match self.input.next_batch()? {
            Some(batch) => Ok(Some(self.project(&batch)?)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        format!("ProjectionExec: {}", exprs.join(", "))
    }
}
