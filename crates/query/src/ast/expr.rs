//! Expression AST definitions.

use std::fmt;
use strata_core::Value;
use strata_dynparquet::split_dynamic_column_name;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Returns true for the comparison operators.
    pub fn is_comparison(&self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns the operator with its operands swapped (`a < b` is `b > a`).
    pub fn swap(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        f.write_str(s)
    }
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Sum,
    Min,
    Max,
    Count,
    Avg,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Count => "count",
            AggregateFunc::Avg => "avg",
        };
        f.write_str(s)
    }
}

/// Matches the concrete columns an expression reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnMatcher {
    /// A single column by exact name.
    Static(String),
    /// Every realized member of a dynamic group.
    DynamicGroup(String),
}

impl ColumnMatcher {
    /// Returns true if the concrete column `name` is matched.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            ColumnMatcher::Static(column) => column == name,
            ColumnMatcher::DynamicGroup(group) => split_dynamic_column_name(name)
                .map(|(g, member)| g == group && !member.is_empty())
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for ColumnMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnMatcher::Static(column) => f.write_str(column),
            ColumnMatcher::DynamicGroup(group) => write!(f, "{}.*", group),
        }
    }
}

/// Expression AST node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Concrete column reference, static or `group.member`.
    Column(String),
    /// All realized members of a dynamic group.
    DynamicColumn(String),
    /// Literal value.
    Literal(Value),
    /// Binary comparison or logical operation.
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Aggregate function applied to an expression.
    AggregateFunction {
        func: AggregateFunc,
        expr: Box<Expr>,
    },
    /// Renamed expression.
    Alias { expr: Box<Expr>, name: String },
}

/// Creates a column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Creates a reference to every member of a dynamic group.
pub fn dyn_col(group: impl Into<String>) -> Expr {
    Expr::DynamicColumn(group.into())
}

/// Creates a literal.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

fn aggregate(func: AggregateFunc, expr: Expr) -> Expr {
    Expr::AggregateFunction {
        func,
        expr: Box::new(expr),
    }
}

pub fn sum(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Sum, expr)
}

pub fn min(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Min, expr)
}

pub fn max(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Max, expr)
}

pub fn count(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Count, expr)
}

pub fn avg(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Avg, expr)
}

impl Expr {
    /// Creates a binary expression.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Le, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Ge, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Or, other)
    }

    /// Renames this expression.
    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    /// Returns the name of the column this expression produces.
    ///
    /// For a dynamic column this is the group name; the concrete output
    /// columns are its realized members.
    pub fn name(&self) -> String {
        match self {
            Expr::Column(name) | Expr::DynamicColumn(name) => name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the expression under any aliases.
    pub fn unalias(&self) -> &Expr {
        match self {
            Expr::Alias { expr, .. } => expr.unalias(),
            other => other,
        }
    }

    /// Returns true if an aggregate function appears anywhere in this
    /// expression.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::AggregateFunction { .. } => true,
            Expr::BinaryExpr { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Alias { expr, .. } => expr.contains_aggregate(),
            Expr::Column(_) | Expr::DynamicColumn(_) | Expr::Literal(_) => false,
        }
    }

    /// Returns the columns this expression reads, in first-use order and
    /// without duplicates.
    pub fn columns_used(&self) -> Vec<ColumnMatcher> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<ColumnMatcher>) {
        let matcher = match self {
            Expr::Column(name) => ColumnMatcher::Static(name.clone()),
            Expr::DynamicColumn(group) => ColumnMatcher::DynamicGroup(group.clone()),
            Expr::Literal(_) => return,
            Expr::BinaryExpr { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
                return;
            }
            Expr::AggregateFunction { expr, .. } | Expr::Alias { expr, .. } => {
                expr.collect_columns(out);
                return;
            }
        };
        if !out.contains(&matcher) {
            out.push(matcher);
        }
    }

    /// Splits a conjunction into its AND-ed terms.
    pub fn split_conjunction(&self) -> Vec<&Expr> {
        match self {
            Expr::BinaryExpr {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let mut terms = left.split_conjunction();
                terms.extend(right.split_conjunction());
                terms
            }
            other => vec![other],
        }
    }

    /// AND-s a list of predicates together.
    pub fn conjunction(predicates: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        predicates.into_iter().reduce(|acc, p| acc.and(p))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(name),
            Expr::DynamicColumn(group) => write!(f, "{}.*", group),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::BinaryExpr { left, op, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expr::AggregateFunction { func, expr } => write!(f, "{}({})", func, expr),
            Expr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::BinaryExpr { .. } => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}
