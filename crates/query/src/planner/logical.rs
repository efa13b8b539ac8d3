//! Logical query plan definitions.

use crate::ast::{ColumnMatcher, Expr};
use crate::config::ScanOptions;
use crate::provider::TableReader;
use std::fmt;
use std::sync::Arc;

/// Scan of a table's rows.
///
/// Besides naming the table, a scan collects whatever the optimizers pushed
/// into it: the columns to read, a filter to evaluate while reading and
/// columns to de-duplicate on.
#[derive(Clone)]
pub struct TableScan {
    pub table_name: String,
    /// Reader resolved when the scan was built, `None` if the provider did
    /// not know the table.
    pub table: Option<Arc<dyn TableReader>>,
    pub options: ScanOptions,
    /// Columns to read. `None` reads every column.
    pub projection: Option<Vec<ColumnMatcher>>,
    pub filter: Option<Expr>,
    pub distinct: Vec<Expr>,
}

impl TableScan {
    pub fn new(
        table_name: impl Into<String>,
        table: Option<Arc<dyn TableReader>>,
        options: ScanOptions,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            table,
            options,
            projection: None,
            filter: None,
            distinct: Vec::new(),
        }
    }
}

impl fmt::Debug for TableScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableScan")
            .field("table_name", &self.table_name)
            .field("resolved", &self.table.is_some())
            .field("options", &self.options)
            .field("projection", &self.projection)
            .field("filter", &self.filter)
            .field("distinct", &self.distinct)
            .finish()
    }
}

impl PartialEq for TableScan {
    fn eq(&self, other: &Self) -> bool {
        self.table_name == other.table_name
            && same_reader(&self.table, &other.table)
            && self.options == other.options
            && self.projection == other.projection
            && self.filter == other.filter
            && self.distinct == other.distinct
    }
}

/// Scan of a table's realized column names.
#[derive(Clone)]
pub struct SchemaScan {
    pub table_name: String,
    pub table: Option<Arc<dyn TableReader>>,
    pub options: ScanOptions,
}

impl SchemaScan {
    pub fn new(
        table_name: impl Into<String>,
        table: Option<Arc<dyn TableReader>>,
        options: ScanOptions,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            table,
            options,
        }
    }
}

impl fmt::Debug for SchemaScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaScan")
            .field("table_name", &self.table_name)
            .field("resolved", &self.table.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl PartialEq for SchemaScan {
    fn eq(&self, other: &Self) -> bool {
        self.table_name == other.table_name
            && same_reader(&self.table, &other.table)
            && self.options == other.options
    }
}

fn same_reader(a: &Option<Arc<dyn TableReader>>, b: &Option<Arc<dyn TableReader>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        (None, None) => true,
        _ => false,
    }
}

/// Logical query plan node.
#[derive(Clone, Debug, PartialEq)]
pub enum LogicalPlan {
    /// Table scan.
    TableScan(TableScan),

    /// Scan of the realized column names of a table.
    SchemaScan(SchemaScan),

    /// Filter rows on a predicate.
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },

    /// Aggregation of one aggregate expression over groups.
    Aggregate {
        input: Box<LogicalPlan>,
        aggregate: Expr,
        group_by: Vec<Expr>,
    },

    /// Distinct rows over the given columns.
    Distinct {
        input: Box<LogicalPlan>,
        columns: Vec<Expr>,
    },

    /// Projection (output columns).
    Projection {
        input: Box<LogicalPlan>,
        exprs: Vec<Expr>,
    },
}

impl LogicalPlan {
    /// Creates a table scan plan.
    pub fn table_scan(scan: TableScan) -> Self {
        LogicalPlan::TableScan(scan)
    }

    /// Creates a schema scan plan.
    pub fn schema_scan(scan: SchemaScan) -> Self {
        LogicalPlan::SchemaScan(scan)
    }

    /// Creates a filter plan.
    pub fn filter(input: LogicalPlan, predicate: Expr) -> Self {
        LogicalPlan::Filter {
            input: Box::new(input),
            predicate,
        }
    }

    /// Creates an aggregate plan.
    pub fn aggregate(input: LogicalPlan, aggregate: Expr, group_by: Vec<Expr>) -> Self {
        LogicalPlan::Aggregate {
            input: Box::new(input),
            aggregate,
            group_by,
        }
    }

    /// Creates a distinct plan.
    pub fn distinct(input: LogicalPlan, columns: Vec<Expr>) -> Self {
        LogicalPlan::Distinct {
            input: Box::new(input),
            columns,
        }
    }

    /// Creates a projection plan.
    pub fn projection(input: LogicalPlan, exprs: Vec<Expr>) -> Self {
        LogicalPlan::Projection {
            input: Box::new(input),
            exprs,
        }
    }

    /// Returns the input of this node, `None` for scans.
    pub fn input(&self) -> Option<&LogicalPlan> {
        match self {
            LogicalPlan::TableScan(_) | LogicalPlan::SchemaScan(_) => None,
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Distinct { input, .. }
            | LogicalPlan::Projection { input, .. } => Some(input),
        }
    }

    /// Returns the table scan at the bottom of this plan, if it scans rows.
    pub fn table_scan_node(&self) -> Option<&TableScan> {
        match self {
            LogicalPlan::TableScan(scan) => Some(scan),
            other => other.input()?.table_scan_node(),
        }
    }

    /// Returns the name of the scanned table.
    pub fn table_name(&self) -> &str {
        match self {
            LogicalPlan::TableScan(scan) => &scan.table_name,
            LogicalPlan::SchemaScan(scan) => &scan.table_name,
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Distinct { input, .. }
            | LogicalPlan::Projection { input, .. } => input.table_name(),
        }
    }

    /// Returns the resolved reader of the scanned table.
    pub fn table(&self) -> Option<&Arc<dyn TableReader>> {
        match self {
            LogicalPlan::TableScan(scan) => scan.table.as_ref(),
            LogicalPlan::SchemaScan(scan) => scan.table.as_ref(),
            other => other.input()?.table(),
        }
    }

    /// Visits every expression of the plan, scans included.
    pub fn for_each_expr<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        match self {
            LogicalPlan::TableScan(scan) => {
                scan.filter.iter().for_each(&mut *f);
                scan.distinct.iter().for_each(&mut *f);
            }
            LogicalPlan::SchemaScan(_) => {}
            LogicalPlan::Filter { input, predicate } => {
                f(predicate);
                input.for_each_expr(f);
            }
            LogicalPlan::Aggregate {
                input,
                aggregate,
                group_by,
            } => {
                f(aggregate);
                group_by.iter().for_each(&mut *f);
                input.for_each_expr(f);
            }
            LogicalPlan::Distinct { input, columns } => {
                columns.iter().for_each(&mut *f);
                input.for_each_expr(f);
            }
            LogicalPlan::Projection { input, exprs } => {
                exprs.iter().for_each(&mut *f);
                input.for_each_expr(f);
            }
        }
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:width$}", "", width = depth * 2)?;
        match self {
            LogicalPlan::TableScan(scan) => {
                write!(f, "TableScan: {}", scan.table_name)?;
                if let Some(projection) = &scan.projection {
                    write!(f, " projection=[{}]", join(projection))?;
                }
                if let Some(filter) = &scan.filter {
                    write!(f, " filter={}", filter)?;
                }
                if !scan.distinct.is_empty() {
                    write!(f, " distinct=[{}]", join(&scan.distinct))?;
                }
            }
            LogicalPlan::SchemaScan(scan) => write!(f, "SchemaScan: {}", scan.table_name)?,
            LogicalPlan::Filter { predicate, .. } => write!(f, "Filter: {}", predicate)?,
            LogicalPlan::Aggregate {
                aggregate,
                group_by,
                ..
            } => write!(f, "Aggregate: {} group_by=[{}]", aggregate, join(group_by))?,
            LogicalPlan::Distinct { columns, .. } => write!(f, "Distinct: {}", join(columns))?,
            LogicalPlan::Projection { exprs, .. } => write!(f, "Projection: {}", join(exprs))?,
        }
        writeln!(f)?;
        match self.input() {
            Some(input) => input.fmt_indent(f, depth + 1),
            None => Ok(()),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}
