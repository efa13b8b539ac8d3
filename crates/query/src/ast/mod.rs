//! AST module for query expressions.

mod expr;

pub use expr::{
    avg, col, count, dyn_col, lit, max, min, sum, AggregateFunc, BinaryOp, ColumnMatcher, Expr,
};
