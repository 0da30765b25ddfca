//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing query ASTs, particularly useful for tests.
//!
//! ## Example
//!
//! ```rust
//! use sql2ddlog::ast::builders::{qcol, table, QueryBuilder};
//!
//! // SELECT DISTINCT t1.column2 FROM t1 JOIN t2 ON t1.column1 = t2.column1
//! let query = QueryBuilder::new()
//!     .distinct()
//!     .select(qcol("t1", "column2"))
//!     .from(table("t1").join(table("t2"), qcol("t1", "column1").eq(qcol("t2", "column1"))))
//!     .build();
//! assert!(query.distinct);
//! ```

use super::{
    AggregateFunc, BinaryOp, Expr, JoinConstraint, JoinKind, Literal, Query, SelectItem,
    TableExpr, UnaryOp, ViewDefinition,
};

// Expressions

/// Unqualified column reference
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        name: name.to_string(),
    }
}

/// Qualified column reference `table.name`
pub fn qcol(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

pub fn lit_int(value: i64) -> Expr {
    Expr::Literal(Literal::Integer(value))
}

pub fn lit_double(value: f64) -> Expr {
    Expr::Literal(Literal::Double(value))
}

pub fn lit_str(value: &str) -> Expr {
    Expr::Literal(Literal::String(value.to_string()))
}

pub fn lit_bool(value: bool) -> Expr {
    Expr::Literal(Literal::Boolean(value))
}

pub fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// `COUNT(*)`
pub fn count_star() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    }
}

pub fn count(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Count, arg)
}

pub fn sum(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Sum, arg)
}

pub fn min(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Min, arg)
}

pub fn max(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Max, arg)
}

pub fn avg(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Avg, arg)
}

pub fn aggregate(func: AggregateFunc, arg: Expr) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(arg)),
        distinct: false,
    }
}

/// `[NOT] EXISTS (query)`
pub fn exists(query: Query) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: false,
    }
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs),
        }
    }

    #[must_use]
    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    #[must_use]
    pub fn not_eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    #[must_use]
    pub fn lt_eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    #[must_use]
    pub fn gt_eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, rhs)
    }

    #[must_use]
    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    #[must_use]
    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    #[must_use]
    pub fn plus(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Plus, rhs)
    }

    #[must_use]
    pub fn minus(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Minus, rhs)
    }

    #[must_use]
    pub fn times(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, rhs)
    }

    #[must_use]
    pub fn divide(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Divide, rhs)
    }

    #[must_use]
    pub fn modulo(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Modulo, rhs)
    }

    #[must_use]
    pub fn concat(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Concat, rhs)
    }

    #[must_use]
    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    #[must_use]
    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Minus,
            expr: Box::new(self),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }
}

// FROM items

pub fn table(name: &str) -> TableExpr {
    TableExpr::Table {
        name: name.to_string(),
        alias: None,
    }
}

pub fn table_as(name: &str, alias: &str) -> TableExpr {
    TableExpr::Table {
        name: name.to_string(),
        alias: Some(alias.to_string()),
    }
}

/// Derived table `(query) AS alias`
pub fn derived(query: Query, alias: &str) -> TableExpr {
    TableExpr::Derived {
        query: Box::new(query),
        alias: Some(alias.to_string()),
    }
}

impl TableExpr {
    /// `self <kind> JOIN right <constraint>`
    #[must_use]
    pub fn join_with(self, right: TableExpr, kind: JoinKind, constraint: JoinConstraint) -> TableExpr {
        TableExpr::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            constraint,
        }
    }

    /// `self JOIN right ON on`
    #[must_use]
    pub fn join(self, right: TableExpr, on: Expr) -> TableExpr {
        self.join_with(right, JoinKind::Inner, JoinConstraint::On(on))
    }

    #[must_use]
    pub fn left_join(self, right: TableExpr, on: Expr) -> TableExpr {
        self.join_with(right, JoinKind::Left, JoinConstraint::On(on))
    }

    #[must_use]
    pub fn right_join(self, right: TableExpr, on: Expr) -> TableExpr {
        self.join_with(right, JoinKind::Right, JoinConstraint::On(on))
    }

    #[must_use]
    pub fn full_join(self, right: TableExpr, on: Expr) -> TableExpr {
        self.join_with(right, JoinKind::Full, JoinConstraint::On(on))
    }

    #[must_use]
    pub fn join_using(self, right: TableExpr, columns: &[&str]) -> TableExpr {
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.join_with(right, JoinKind::Inner, JoinConstraint::Using(columns))
    }

    #[must_use]
    pub fn left_join_using(self, right: TableExpr, columns: &[&str]) -> TableExpr {
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.join_with(right, JoinKind::Left, JoinConstraint::Using(columns))
    }

    #[must_use]
    pub fn natural_join(self, right: TableExpr) -> TableExpr {
        self.join_with(right, JoinKind::Inner, JoinConstraint::Natural)
    }

    #[must_use]
    pub fn cross_join(self, right: TableExpr) -> TableExpr {
        self.join_with(right, JoinKind::Cross, JoinConstraint::None)
    }
}

// Queries

/// Builder for constructing `Query` instances
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    distinct: bool,
    select: Vec<SelectItem>,
    from: Vec<TableExpr>,
    selection: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Append `*`
    #[must_use]
    pub fn select_all(mut self) -> Self {
        self.select.push(SelectItem::Wildcard);
        self
    }

    /// Append `table.*`
    #[must_use]
    pub fn select_all_from(mut self, table: &str) -> Self {
        self.select
            .push(SelectItem::QualifiedWildcard(table.to_string()));
        self
    }

    #[must_use]
    pub fn select(mut self, expr: Expr) -> Self {
        self.select.push(SelectItem::Expr { expr, alias: None });
        self
    }

    #[must_use]
    pub fn select_as(mut self, expr: Expr, alias: &str) -> Self {
        self.select.push(SelectItem::Expr {
            expr,
            alias: Some(alias.to_string()),
        });
        self
    }

    #[must_use]
    pub fn from(mut self, item: TableExpr) -> Self {
        self.from.push(item);
        self
    }

    /// Add a WHERE conjunct
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = Some(match self.selection.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    #[must_use]
    pub fn group_by(mut self, key: Expr) -> Self {
        self.group_by.push(key);
        self
    }

    #[must_use]
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(predicate);
        self
    }

    pub fn build(self) -> Query {
        Query {
            distinct: self.distinct,
            select: self.select,
            from: self.from,
            selection: self.selection,
            group_by: self.group_by,
            having: self.having,
            location: None,
        }
    }

    /// Finish as `CREATE VIEW name AS ...`
    pub fn view(self, name: &str) -> ViewDefinition {
        ViewDefinition::new(name, self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accumulates_conjuncts() {
        let query = QueryBuilder::new()
            .select_all()
            .from(table("t"))
            .filter(col("a").eq(lit_int(1)))
            .filter(col("b"))
            .build();
        let selection = query.selection.unwrap();
        assert_eq!(selection.conjuncts().len(), 2);
    }

    #[test]
    fn test_join_using_builder() {
        let item = table("t1").join_using(table("t2"), &["column1"]);
        match item {
            TableExpr::Join {
                kind, constraint, ..
            } => {
                assert_eq!(kind, JoinKind::Inner);
                assert_eq!(constraint, JoinConstraint::Using(vec!["column1".to_string()]));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_view_builder() {
        let view = QueryBuilder::new()
            .select_as(count_star(), "ct")
            .from(table_as("t1", "a"))
            .view("v0");
        assert_eq!(view.name, "v0");
        assert_eq!(view.to_string(), "CREATE VIEW v0 AS SELECT COUNT(*) AS ct FROM t1 AS a");
    }
}
