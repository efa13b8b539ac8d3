//! Row-group pruning from column chunk statistics.
//!
//! A row group is skipped only when its statistics prove that no row can
//! satisfy the scan filter. Anything the statistics cannot decide is read.

use crate::ast::{BinaryOp, Expr};
use std::cmp::Ordering;
use strata_core::Value;
use strata_dynparquet::RowGroupReader;

/// Returns true if no row of `row_group` can satisfy `predicate`.
pub fn can_skip(predicate: &Expr, row_group: &RowGroupReader<'_>) -> bool {
    match predicate.unalias() {
        Expr::BinaryExpr {
            left,
            op: BinaryOp::And,
            right,
        } => can_skip(left, row_group) || can_skip(right, row_group),
        Expr::BinaryExpr {
            left,
            op: BinaryOp::Or,
            right,
        } => can_skip(left, row_group) && can_skip(right, row_group),
        Expr::BinaryExpr { left, op, right } => {
            match (left.unalias(), right.unalias()) {
                (Expr::Column(name), Expr::Literal(value)) => {
                    can_skip_comparison(name, *op, value, row_group)
                }
                (Expr::Literal(value), Expr::Column(name)) => {
                    can_skip_comparison(name, op.swap(), value, row_group)
                }
                _ => false,
            }
        }
        Expr::Literal(Value::Boolean(false)) | Expr::Literal(Value::Null) => true,
        _ => false,
    }
}

fn can_skip_comparison(
    column: &str,
    op: BinaryOp,
    value: &Value,
    row_group: &RowGroupReader<'_>,
) -> bool {
    // Comparing with null never matches.
    if value.is_null() {
        return true;
    }
    // Unrealized columns read as all null.
    if !row_group.has_column(column) {
        return true;
    }
    let Some(stats) = row_group.column_statistics(column) else {
        return false;
    };
    let num_rows = row_group.num_rows() as u64;
    if num_rows > 0 && stats.null_count == Some(num_rows) {
        return true;
    }
    let (Some(min), Some(max)) = (&stats.min, &stats.max) else {
        return false;
    };
    let (Some(value_min), Some(value_max)) = (compare(value, min), compare(value, max)) else {
        return false;
    };

    match op {
        BinaryOp::Eq => value_min == Ordering::Less || value_max == Ordering::Greater,
        BinaryOp::Ne => value_min == Ordering::Equal && value_max == Ordering::Equal,
        // Every row is >= min, so `col < v` fails everywhere when min >= v.
        BinaryOp::Lt => value_min != Ordering::Greater,
        BinaryOp::Le => value_min == Ordering::Less,
        BinaryOp::Gt => value_max != Ordering::Less,
        BinaryOp::Ge => value_max == Ordering::Greater,
        BinaryOp::And | BinaryOp::Or => false,
    }
}

/// Orders `value` against a statistics bound of the same kind.
///
/// Float bounds never decide: writers leave NaN out of min/max, and the
/// filter kernels order NaN above every number and -0.0 below 0.0.
fn compare(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Float64(_), _) | (_, Value::Float64(_)) => None,
        (v, b) if v.same_type(b) => Some(v.cmp(b)),
        _ => None,
    }
}
