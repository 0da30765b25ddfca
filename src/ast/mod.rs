//! # Query AST - Abstract Syntax Tree Types
//!
//! Relational query AST consumed by the compiler. Producing it from SQL text is
//! the job of an external parser; hosts may also deserialize it from JSON.
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes, see the [`builders`] module
//! which provides fluent APIs like `QueryBuilder` and column/literal helpers.

use crate::error::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod builders;

// ============================================================================
// Views and Queries
// ============================================================================

/// `CREATE VIEW <name> AS <query>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    pub query: Query,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        ViewDefinition {
            name: name.into(),
            query,
            location: None,
        }
    }
}

/// A SELECT block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// SELECT DISTINCT
    #[serde(default)]
    pub distinct: bool,
    /// Select list, in output order
    pub select: Vec<SelectItem>,
    /// FROM items; a comma-separated list is an implicit cross join
    pub from: Vec<TableExpr>,
    /// WHERE predicate
    #[serde(default)]
    pub selection: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub having: Option<Expr>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl Query {
    /// True if the select list or HAVING contains an aggregate call
    pub fn has_aggregates(&self) -> bool {
        let in_select = self.select.iter().any(|item| match item {
            SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
            SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => false,
        });
        in_select || self.having.as_ref().is_some_and(Expr::contains_aggregate)
    }

    /// True if this block needs grouping (explicit GROUP BY or aggregates)
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregates()
    }

    /// True if the select list is exactly `*`
    pub fn is_select_star(&self) -> bool {
        matches!(self.select.as_slice(), [SelectItem::Wildcard])
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(String),
    /// `expr [AS alias]`
    Expr { expr: Expr, alias: Option<String> },
}

// ============================================================================
// FROM clause
// ============================================================================

/// Join kinds accepted by the parser; the compiler decides which are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// How the join columns are determined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinConstraint {
    /// `ON <expr>`
    On(Expr),
    /// `USING (c1, c2, ...)`
    Using(Vec<String>),
    /// `NATURAL JOIN`
    Natural,
    /// No condition (cross join)
    None,
}

/// An item of the FROM clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableExpr {
    /// Base table, optionally aliased
    Table { name: String, alias: Option<String> },
    /// Derived table: `(SELECT ...) [AS alias]`
    Derived { query: Box<Query>, alias: Option<String> },
    /// Binary join
    Join {
        left: Box<TableExpr>,
        right: Box<TableExpr>,
        kind: JoinKind,
        constraint: JoinConstraint,
    },
}

// ============================================================================
// Scalar expressions
// ============================================================================

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    /// String concatenation (`||`)
    Concat,
}

impl BinaryOp {
    /// SQL spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunc {
    /// Parse an aggregate name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            "avg" => Some(AggregateFunc::Avg),
            _ => None,
        }
    }

    /// Lowercase name, also used to name helpers and default output columns
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Avg => "avg",
        }
    }
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `[table.]name`
    Column { table: Option<String>, name: String },
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
    /// Aggregate call; `arg == None` means `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// `[NOT] EXISTS (subquery)`
    Exists { query: Box<Query>, negated: bool },
    /// Scalar subquery `(SELECT ...)`
    Subquery(Box<Query>),
}

impl Expr {
    /// True if any aggregate call occurs in this expression
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            Expr::Column { .. } | Expr::Literal(_) | Expr::Exists { .. } | Expr::Subquery(_) => {
                false
            }
        }
    }

    /// Split a conjunction into its conjuncts
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Column reference parts, if this is a column
    pub fn as_column(&self) -> Option<(Option<&str>, &str)> {
        match self {
            Expr::Column { table, name } => Some((table.as_deref(), name.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Display (SQL-ish rendering used in diagnostics)
// ============================================================================

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Double(d) => write!(f, "{d:?}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(true) => write!(f, "TRUE"),
            Literal::Boolean(false) => write!(f, "FALSE"),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column {
                table: Some(t),
                name,
            } => write!(f, "{t}.{name}"),
            Expr::Column { table: None, name } => write!(f, "{name}"),
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.as_str())?;
                write_operand(f, right)
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => {
                write!(f, "NOT ")?;
                write_operand(f, expr)
            }
            Expr::Unary {
                op: UnaryOp::Minus,
                expr,
            } => {
                write!(f, "-")?;
                write_operand(f, expr)
            }
            Expr::IsNull { expr, negated } => {
                write_operand(f, expr)?;
                if *negated {
                    write!(f, " IS NOT NULL")
                } else {
                    write!(f, " IS NULL")
                }
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                write!(f, "{}(", func.as_str().to_uppercase())?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                match arg {
                    Some(arg) => write!(f, "{arg})"),
                    None => write!(f, "*)"),
                }
            }
            Expr::Exists { query, negated } => {
                if *negated {
                    write!(f, "NOT ")?;
                }
                write!(f, "EXISTS ({query})")
            }
            Expr::Subquery(query) => write!(f, "({query})"),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    if matches!(expr, Expr::Binary { .. }) {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Wildcard => write!(f, "*"),
            SelectItem::QualifiedWildcard(t) => write!(f, "{t}.*"),
            SelectItem::Expr { expr, alias: None } => write!(f, "{expr}"),
            SelectItem::Expr {
                expr,
                alias: Some(alias),
            } => write!(f, "{expr} AS {alias}"),
        }
    }
}

impl fmt::Display for TableExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableExpr::Table { name, alias: None } => write!(f, "{name}"),
            TableExpr::Table {
                name,
                alias: Some(alias),
            } => write!(f, "{name} AS {alias}"),
            TableExpr::Derived { query, alias } => {
                write!(f, "({query})")?;
                if let Some(alias) = alias {
                    write!(f, " AS {alias}")?;
                }
                Ok(())
            }
            TableExpr::Join {
                left,
                right,
                kind,
                constraint,
            } => {
                if matches!(constraint, JoinConstraint::Natural) {
                    write!(f, "{left} NATURAL {} {right}", kind.as_str())?;
                } else {
                    write!(f, "{left} {} {right}", kind.as_str())?;
                }
                match constraint {
                    JoinConstraint::On(expr) => write!(f, " ON {expr}"),
                    JoinConstraint::Using(cols) => write!(f, " USING ({})", cols.join(", ")),
                    JoinConstraint::Natural | JoinConstraint::None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        let items: Vec<String> = self.select.iter().map(ToString::to_string).collect();
        write!(f, "{}", items.join(", "))?;
        if !self.from.is_empty() {
            let from: Vec<String> = self.from.iter().map(ToString::to_string).collect();
            write!(f, " FROM {}", from.join(", "))?;
        }
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {selection}")?;
        }
        if !self.group_by.is_empty() {
            let keys: Vec<String> = self.group_by.iter().map(ToString::to_string).collect();
            write!(f, " GROUP BY {}", keys.join(", "))?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {having}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ViewDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE VIEW {} AS {}", self.name, self.query)
    }
}
