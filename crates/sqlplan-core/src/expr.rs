//! SQL expression tree used inside plan nodes.
//!
//! Expressions are plain values compared structurally. Passes never inspect
//! expression text; they work from `lineage()` (what an expression reads) and
//! rewrite through `replace_columns` / `with_table_alias_rendering`.
//! `SqlExpr::String` is the escape hatch for user-supplied SQL fragments; its
//! `used_columns` is `None` when the fragment's inputs are unknown, which forces
//! every pass onto its conservative path.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// `table_alias.column_name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SqlColumnReference {
    pub table_alias: String,
    pub column_name: String,
}

impl SqlColumnReference {
    pub fn new(table_alias: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column_name: column_name.into(),
        }
    }
}

impl fmt::Display for SqlColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_alias, self.column_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlComparison {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl SqlComparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlComparison::Eq => "=",
            SqlComparison::NotEq => "<>",
            SqlComparison::Lt => "<",
            SqlComparison::LtEq => "<=",
            SqlComparison::Gt => ">",
            SqlComparison::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlLogicalOperator {
    And,
    Or,
}

impl SqlLogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlLogicalOperator::And => "AND",
            SqlLogicalOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl SqlArithmeticOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlArithmeticOperator::Add => "+",
            SqlArithmeticOperator::Subtract => "-",
            SqlArithmeticOperator::Multiply => "*",
            SqlArithmeticOperator::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlAggregateFunction {
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
}

impl SqlAggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            SqlAggregateFunction::Sum => "SUM",
            SqlAggregateFunction::Count | SqlAggregateFunction::CountDistinct => "COUNT",
            SqlAggregateFunction::Min => "MIN",
            SqlAggregateFunction::Max => "MAX",
            SqlAggregateFunction::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlWindowFunction {
    RowNumber,
    Rank,
    FirstValue,
    LastValue,
    Lag,
    Sum,
    Avg,
    Min,
    Max,
}

impl SqlWindowFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            SqlWindowFunction::RowNumber => "ROW_NUMBER",
            SqlWindowFunction::Rank => "RANK",
            SqlWindowFunction::FirstValue => "FIRST_VALUE",
            SqlWindowFunction::LastValue => "LAST_VALUE",
            SqlWindowFunction::Lag => "LAG",
            SqlWindowFunction::Sum => "SUM",
            SqlWindowFunction::Avg => "AVG",
            SqlWindowFunction::Min => "MIN",
            SqlWindowFunction::Max => "MAX",
        }
    }
}

/// Grains understood by `DATE_TRUNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeGranularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGranularity::Day => "day",
            TimeGranularity::Week => "week",
            TimeGranularity::Month => "month",
            TimeGranularity::Quarter => "quarter",
            TimeGranularity::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlWindowOrderBy {
    pub expr: SqlExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlExpr {
    ColumnReference {
        col_ref: SqlColumnReference,
        render_table_alias: bool,
    },
    /// Unqualified reference to an output alias; the source that renders it
    /// is not known.
    ColumnAliasReference { column_alias: String },
    /// Opaque SQL text.
    String {
        sql: String,
        used_columns: Option<Vec<String>>,
        requires_parenthesis: bool,
    },
    StringLiteral(String),
    Null,
    Comparison {
        left: Box<SqlExpr>,
        op: SqlComparison,
        right: Box<SqlExpr>,
    },
    Logical {
        op: SqlLogicalOperator,
        args: Vec<SqlExpr>,
    },
    IsNull(Box<SqlExpr>),
    Arithmetic {
        left: Box<SqlExpr>,
        op: SqlArithmeticOperator,
        right: Box<SqlExpr>,
    },
    Function { name: String, args: Vec<SqlExpr> },
    Aggregate {
        function: SqlAggregateFunction,
        args: Vec<SqlExpr>,
    },
    Window {
        function: SqlWindowFunction,
        args: Vec<SqlExpr>,
        partition_by: Vec<SqlExpr>,
        order_by: Vec<SqlWindowOrderBy>,
    },
    Cast { arg: Box<SqlExpr>, to: String },
    DateTrunc {
        grain: TimeGranularity,
        arg: Box<SqlExpr>,
    },
    Between {
        expr: Box<SqlExpr>,
        start: Box<SqlExpr>,
        end: Box<SqlExpr>,
    },
}

impl SqlExpr {
    pub fn column(table_alias: impl Into<String>, column_name: impl Into<String>) -> Self {
        SqlExpr::ColumnReference {
            col_ref: SqlColumnReference::new(table_alias, column_name),
            render_table_alias: true,
        }
    }

    pub fn alias_ref(column_alias: impl Into<String>) -> Self {
        SqlExpr::ColumnAliasReference {
            column_alias: column_alias.into(),
        }
    }

    /// Opaque SQL whose inputs are unknown.
    pub fn string(sql: impl Into<String>) -> Self {
        SqlExpr::String {
            sql: sql.into(),
            used_columns: None,
            requires_parenthesis: false,
        }
    }

    pub fn string_with_used_columns<I, S>(sql: impl Into<String>, used_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SqlExpr::String {
            sql: sql.into(),
            used_columns: Some(used_columns.into_iter().map(Into::into).collect()),
            requires_parenthesis: false,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        SqlExpr::StringLiteral(value.into())
    }

    pub fn compare(left: SqlExpr, op: SqlComparison, right: SqlExpr) -> Self {
        SqlExpr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(left: SqlExpr, right: SqlExpr) -> Self {
        Self::compare(left, SqlComparison::Eq, right)
    }

    pub fn and(args: Vec<SqlExpr>) -> Self {
        SqlExpr::Logical {
            op: SqlLogicalOperator::And,
            args,
        }
    }

    pub fn or(args: Vec<SqlExpr>) -> Self {
        SqlExpr::Logical {
            op: SqlLogicalOperator::Or,
            args,
        }
    }

    pub fn is_null(arg: SqlExpr) -> Self {
        SqlExpr::IsNull(Box::new(arg))
    }

    pub fn arithmetic(left: SqlExpr, op: SqlArithmeticOperator, right: SqlExpr) -> Self {
        SqlExpr::Arithmetic {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn aggregate(function: SqlAggregateFunction, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Aggregate { function, args }
    }

    pub fn sum(arg: SqlExpr) -> Self {
        Self::aggregate(SqlAggregateFunction::Sum, vec![arg])
    }

    pub fn max(arg: SqlExpr) -> Self {
        Self::aggregate(SqlAggregateFunction::Max, vec![arg])
    }

    pub fn window(
        function: SqlWindowFunction,
        args: Vec<SqlExpr>,
        partition_by: Vec<SqlExpr>,
        order_by: Vec<SqlWindowOrderBy>,
    ) -> Self {
        SqlExpr::Window {
            function,
            args,
            partition_by,
            order_by,
        }
    }

    pub fn cast(arg: SqlExpr, to: impl Into<String>) -> Self {
        SqlExpr::Cast {
            arg: Box::new(arg),
            to: to.into(),
        }
    }

    pub fn date_trunc(grain: TimeGranularity, arg: SqlExpr) -> Self {
        SqlExpr::DateTrunc {
            grain,
            arg: Box::new(arg),
        }
    }

    pub fn between(expr: SqlExpr, start: SqlExpr, end: SqlExpr) -> Self {
        SqlExpr::Between {
            expr: Box::new(expr),
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    /// AND two optional predicates, flattening a left-hand conjunction.
    pub fn conjoin(left: Option<SqlExpr>, right: Option<SqlExpr>) -> Option<SqlExpr> {
        match (left, right) {
            (None, r) => r,
            (l, None) => l,
            (
                Some(SqlExpr::Logical {
                    op: SqlLogicalOperator::And,
                    mut args,
                }),
                Some(r),
            ) => {
                args.push(r);
                Some(SqlExpr::and(args))
            }
            (Some(l), Some(r)) => Some(SqlExpr::and(vec![l, r])),
        }
    }

    pub fn as_column_reference(&self) -> Option<&SqlColumnReference> {
        match self {
            SqlExpr::ColumnReference { col_ref, .. } => Some(col_ref),
            _ => None,
        }
    }

    pub fn as_column_alias_reference(&self) -> Option<&str> {
        match self {
            SqlExpr::ColumnAliasReference { column_alias } => Some(column_alias),
            _ => None,
        }
    }

    /// The SQL text and declared inputs of an opaque string expression.
    pub fn as_string_expr(&self) -> Option<(&str, Option<&[String]>)> {
        match self {
            SqlExpr::String {
                sql, used_columns, ..
            } => Some((sql.as_str(), used_columns.as_deref())),
            _ => None,
        }
    }

    pub fn requires_parenthesis(&self) -> bool {
        match self {
            SqlExpr::Comparison { .. }
            | SqlExpr::Logical { .. }
            | SqlExpr::Arithmetic { .. }
            | SqlExpr::Between { .. } => true,
            SqlExpr::String {
                requires_parenthesis,
                ..
            } => *requires_parenthesis,
            _ => false,
        }
    }

    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&SqlExpr> {
        match self {
            SqlExpr::ColumnReference { .. }
            | SqlExpr::ColumnAliasReference { .. }
            | SqlExpr::String { .. }
            | SqlExpr::StringLiteral(_)
            | SqlExpr::Null => Vec::new(),
            SqlExpr::Comparison { left, right, .. } | SqlExpr::Arithmetic { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            SqlExpr::Logical { args, .. }
            | SqlExpr::Function { args, .. }
            | SqlExpr::Aggregate { args, .. } => args.iter().collect(),
            SqlExpr::IsNull(arg) | SqlExpr::Cast { arg, .. } | SqlExpr::DateTrunc { arg, .. } => {
                vec![arg.as_ref()]
            }
            SqlExpr::Window {
                args,
                partition_by,
                order_by,
                ..
            } => args
                .iter()
                .chain(partition_by.iter())
                .chain(order_by.iter().map(|o| &o.expr))
                .collect(),
            SqlExpr::Between { expr, start, end } => {
                vec![expr.as_ref(), start.as_ref(), end.as_ref()]
            }
        }
    }

    /// Pre-order walk over this expression and all sub-expressions.
    pub fn walk<'a, F: FnMut(&'a SqlExpr)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(&mut *f);
        }
    }

    /// Rebuild this node with each direct child replaced by `f(child)`.
    fn map_children<F: FnMut(&SqlExpr) -> SqlExpr>(&self, f: &mut F) -> SqlExpr {
        let mut boxed = |e: &SqlExpr| Box::new(f(e));
        match self {
            SqlExpr::ColumnReference { .. }
            | SqlExpr::ColumnAliasReference { .. }
            | SqlExpr::String { .. }
            | SqlExpr::StringLiteral(_)
            | SqlExpr::Null => self.clone(),
            SqlExpr::Comparison { left, op, right } => SqlExpr::Comparison {
                left: boxed(left),
                op: *op,
                right: boxed(right),
            },
            SqlExpr::Arithmetic { left, op, right } => SqlExpr::Arithmetic {
                left: boxed(left),
                op: *op,
                right: boxed(right),
            },
            SqlExpr::Logical { op, args } => SqlExpr::Logical {
                op: *op,
                args: args.iter().map(|a| *boxed(a)).collect(),
            },
            SqlExpr::IsNull(arg) => SqlExpr::IsNull(boxed(arg)),
            SqlExpr::Function { name, args } => SqlExpr::Function {
                name: name.clone(),
                args: args.iter().map(|a| *boxed(a)).collect(),
            },
            SqlExpr::Aggregate { function, args } => SqlExpr::Aggregate {
                function: *function,
                args: args.iter().map(|a| *boxed(a)).collect(),
            },
            SqlExpr::Window {
                function,
                args,
                partition_by,
                order_by,
            } => SqlExpr::Window {
                function: *function,
                args: args.iter().map(|a| *boxed(a)).collect(),
                partition_by: partition_by.iter().map(|a| *boxed(a)).collect(),
                order_by: order_by
                    .iter()
                    .map(|o| SqlWindowOrderBy {
                        expr: *boxed(&o.expr),
                        descending: o.descending,
                    })
                    .collect(),
            },
            SqlExpr::Cast { arg, to } => SqlExpr::Cast {
                arg: boxed(arg),
                to: to.clone(),
            },
            SqlExpr::DateTrunc { grain, arg } => SqlExpr::DateTrunc {
                grain: *grain,
                arg: boxed(arg),
            },
            SqlExpr::Between { expr, start, end } => SqlExpr::Between {
                expr: boxed(expr),
                start: boxed(start),
                end: boxed(end),
            },
        }
    }

    /// Top-down rewrite: where `f` returns a replacement it is used as-is and
    /// not descended into; elsewhere children are rewritten recursively.
    pub fn transform<F: FnMut(&SqlExpr) -> Option<SqlExpr>>(&self, f: &mut F) -> SqlExpr {
        match f(self) {
            Some(replacement) => replacement,
            None => self.map_children(&mut |child: &SqlExpr| child.transform(&mut *f)),
        }
    }

    /// Substitute column references found in `replacements`.
    pub fn replace_columns(&self, replacements: &SqlColumnReplacements) -> SqlExpr {
        self.transform(&mut |e: &SqlExpr| {
            e.as_column_reference()
                .and_then(|col_ref| replacements.get(col_ref))
                .cloned()
        })
    }

    /// Set whether every column reference in this tree renders its table alias.
    pub fn with_table_alias_rendering(&self, render_table_alias: bool) -> SqlExpr {
        self.transform(&mut |e: &SqlExpr| match e {
            SqlExpr::ColumnReference { col_ref, .. } => Some(SqlExpr::ColumnReference {
                col_ref: col_ref.clone(),
                render_table_alias,
            }),
            _ => None,
        })
    }

    pub fn lineage(&self) -> SqlExprLineage {
        let mut lineage = SqlExprLineage::default();
        self.walk(&mut |e: &SqlExpr| match e {
            SqlExpr::ColumnReference { col_ref, .. } => {
                lineage.column_references.push(col_ref.clone())
            }
            SqlExpr::ColumnAliasReference { column_alias } => {
                lineage.column_alias_references.push(column_alias.clone())
            }
            SqlExpr::String {
                sql, used_columns, ..
            } => lineage.string_exprs.push(SqlStringExprUsage {
                sql: sql.clone(),
                used_columns: used_columns.clone(),
            }),
            SqlExpr::Aggregate { .. } => lineage.contains_aggregate = true,
            SqlExpr::Window { .. } => lineage.contains_window_function = true,
            _ => {}
        });
        lineage
    }
}

/// An opaque string expression found while walking a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStringExprUsage {
    pub sql: String,
    pub used_columns: Option<Vec<String>>,
}

/// What an expression (or a set of expressions) reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlExprLineage {
    pub column_references: Vec<SqlColumnReference>,
    pub column_alias_references: Vec<String>,
    pub string_exprs: Vec<SqlStringExprUsage>,
    pub contains_aggregate: bool,
    pub contains_window_function: bool,
}

impl SqlExprLineage {
    pub fn combine(lineages: impl IntoIterator<Item = SqlExprLineage>) -> Self {
        let mut out = SqlExprLineage::default();
        for l in lineages {
            out.column_references.extend(l.column_references);
            out.column_alias_references.extend(l.column_alias_references);
            out.string_exprs.extend(l.string_exprs);
            out.contains_aggregate |= l.contains_aggregate;
            out.contains_window_function |= l.contains_window_function;
        }
        out
    }

    /// True if some string expression does not declare its inputs.
    pub fn has_unknown_used_columns(&self) -> bool {
        self.string_exprs.iter().any(|s| s.used_columns.is_none())
    }
}

/// Column reference → expression to substitute for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlColumnReplacements {
    replacements: HashMap<SqlColumnReference, SqlExpr>,
}

impl SqlColumnReplacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, col_ref: SqlColumnReference, expr: SqlExpr) {
        self.replacements.insert(col_ref, expr);
    }

    pub fn get(&self, col_ref: &SqlColumnReference) -> Option<&SqlExpr> {
        self.replacements.get(col_ref)
    }

    pub fn contains(&self, col_ref: &SqlColumnReference) -> bool {
        self.replacements.contains_key(col_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }
}

fn fmt_arg(f: &mut fmt::Formatter<'_>, e: &SqlExpr) -> fmt::Result {
    if e.requires_parenthesis() {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

fn fmt_list(f: &mut fmt::Formatter<'_>, exprs: &[SqlExpr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::ColumnReference {
                col_ref,
                render_table_alias,
            } => {
                if *render_table_alias {
                    write!(f, "{}", col_ref)
                } else {
                    f.write_str(&col_ref.column_name)
                }
            }
            SqlExpr::ColumnAliasReference { column_alias } => f.write_str(column_alias),
            SqlExpr::String { sql, .. } => f.write_str(sql),
            SqlExpr::StringLiteral(value) => write!(f, "'{}'", value.replace('\'', "''")),
            SqlExpr::Null => f.write_str("NULL"),
            SqlExpr::Comparison { left, op, right } => {
                fmt_arg(f, left)?;
                write!(f, " {} ", op.as_sql())?;
                fmt_arg(f, right)
            }
            SqlExpr::Logical { op, args } => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.as_sql())?;
                    }
                    fmt_arg(f, arg)?;
                }
                Ok(())
            }
            SqlExpr::IsNull(arg) => {
                fmt_arg(f, arg)?;
                f.write_str(" IS NULL")
            }
            SqlExpr::Arithmetic { left, op, right } => {
                fmt_arg(f, left)?;
                write!(f, " {} ", op.as_sql())?;
                fmt_arg(f, right)
            }
            SqlExpr::Function { name, args } => {
                write!(f, "{}(", name)?;
                fmt_list(f, args)?;
                f.write_str(")")
            }
            SqlExpr::Aggregate { function, args } => {
                write!(f, "{}(", function.sql_name())?;
                if *function == SqlAggregateFunction::CountDistinct {
                    f.write_str("DISTINCT ")?;
                }
                if args.is_empty() {
                    f.write_str("*")?;
                } else {
                    fmt_list(f, args)?;
                }
                f.write_str(")")
            }
            SqlExpr::Window {
                function,
                args,
                partition_by,
                order_by,
            } => {
                write!(f, "{}(", function.sql_name())?;
                fmt_list(f, args)?;
                f.write_str(") OVER (")?;
                if !partition_by.is_empty() {
                    f.write_str("PARTITION BY ")?;
                    fmt_list(f, partition_by)?;
                }
                if !order_by.is_empty() {
                    if !partition_by.is_empty() {
                        f.write_str(" ")?;
                    }
                    f.write_str("ORDER BY ")?;
                    for (i, o) in order_by.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", o.expr)?;
                        if o.descending {
                            f.write_str(" DESC")?;
                        }
                    }
                }
                f.write_str(")")
            }
            SqlExpr::Cast { arg, to } => write!(f, "CAST({} AS {})", arg, to),
            SqlExpr::DateTrunc { grain, arg } => {
                write!(f, "DATE_TRUNC('{}', {})", grain.as_str(), arg)
            }
            SqlExpr::Between { expr, start, end } => {
                fmt_arg(f, expr)?;
                f.write_str(" BETWEEN ")?;
                fmt_arg(f, start)?;
                f.write_str(" AND ")?;
                fmt_arg(f, end)
            }
        }
    }
}
