//! Scalar expression translation.
//!
//! SQL expressions become [`Typed`] scalars; column references are resolved
//! through a [`ScalarEnv`], which decides what a column (or an aggregate call)
//! means in the current context: a field of a row variable inside a rule
//! body, or a group key / accumulator inside a fold function.

use crate::ast::{AggregateFunc, BinaryOp, Expr, Literal, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::ir::{DlBinOp, DlExpr};
use crate::null_semantics::{self as ns, Truth, Typed};
use crate::schema::{qualified_name, RowSchema, Scope};

use super::Frame;

/// Resolves the leaves of a scalar expression
pub trait ScalarEnv {
    /// Meaning of column `table.name` (or `name`)
    fn column(&mut self, table: Option<&str>, name: &str) -> CompileResult<Typed>;

    /// Meaning of an aggregate call; only grouping contexts accept one
    fn aggregate(
        &mut self,
        call: &Expr,
        _func: AggregateFunc,
        _arg: Option<&Expr>,
        _distinct: bool,
    ) -> CompileResult<Typed> {
        Err(CompileError::unsupported(
            call.to_string(),
            "aggregate calls are only allowed in SELECT and HAVING of a grouped query",
        ))
    }
}

pub(crate) fn binary_op(op: BinaryOp) -> DlBinOp {
    match op {
        BinaryOp::Eq => DlBinOp::Eq,
        BinaryOp::NotEq => DlBinOp::Neq,
        BinaryOp::Lt => DlBinOp::Lt,
        BinaryOp::LtEq => DlBinOp::Lte,
        BinaryOp::Gt => DlBinOp::Gt,
        BinaryOp::GtEq => DlBinOp::Gte,
        BinaryOp::And => DlBinOp::And,
        BinaryOp::Or => DlBinOp::Or,
        BinaryOp::Plus => DlBinOp::Plus,
        BinaryOp::Minus => DlBinOp::Minus,
        BinaryOp::Multiply => DlBinOp::Mult,
        BinaryOp::Divide => DlBinOp::Div,
        BinaryOp::Modulo => DlBinOp::Mod,
        BinaryOp::Concat => DlBinOp::Concat,
    }
}

/// Translate a SQL scalar expression
pub fn translate(expr: &Expr, env: &mut dyn ScalarEnv) -> CompileResult<Typed> {
    match expr {
        Expr::Column { table, name } => env.column(table.as_deref(), name),
        Expr::Literal(lit) => Ok(match lit {
            Literal::Integer(i) => Typed::integer(*i),
            Literal::Double(d) => Typed::double(*d),
            Literal::String(s) => Typed::string(s.clone()),
            Literal::Boolean(b) => Typed::truth(Truth::from_bool(*b)),
            Literal::Null => Typed::null(),
        }),
        Expr::Binary { op, left, right } => {
            let construct = expr.to_string();
            let l = translate(left, env)?;
            let r = translate(right, env)?;
            let dl_op = binary_op(*op);
            if op.is_comparison() {
                ns::compare(dl_op, l, r, &construct)
            } else if op.is_logical() {
                ns::logical(dl_op, l, r, &construct)
            } else {
                ns::arithmetic(dl_op, l, r, &construct)
            }
        }
        Expr::Unary { op, expr: inner } => {
            let construct = expr.to_string();
            let operand = translate(inner, env)?;
            match op {
                UnaryOp::Not => ns::not(operand, &construct),
                UnaryOp::Minus => ns::negate(operand, &construct),
            }
        }
        Expr::IsNull {
            expr: inner,
            negated,
        } => Ok(ns::is_null(translate(inner, env)?, *negated)),
        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => env.aggregate(expr, *func, arg.as_deref(), *distinct),
        Expr::Exists { .. } => Err(CompileError::unsupported(
            expr.to_string(),
            "EXISTS subqueries are not supported",
        )),
        Expr::Subquery(_) => Err(CompileError::unsupported(
            expr.to_string(),
            "scalar subqueries are not supported",
        )),
    }
}

/// Error for a column that is not visible locally: correlated if an enclosing
/// query can see it, unknown otherwise
pub(crate) fn unresolved(table: Option<&str>, name: &str, outer: &[Scope]) -> CompileError {
    let qualified = qualified_name(table, name);
    let correlated = outer
        .iter()
        .any(|scope| !matches!(scope.resolve(table, name), Ok(None)));
    if correlated {
        CompileError::unsupported(qualified, "correlated subqueries are not supported")
    } else {
        CompileError::unknown_column(qualified)
    }
}

/// Field index of a column in a single scope
pub fn resolve_field(scope: &Scope, table: Option<&str>, name: &str, outer: &[Scope]) -> CompileResult<usize> {
    scope
        .resolve(table, name)?
        .ok_or_else(|| unresolved(table, name, outer))
}

/// Columns of one or two row variables inside a rule body
pub struct RowEnv<'s> {
    sources: Vec<(&'s Scope, &'s RowSchema, DlExpr)>,
    outer: &'s [Scope],
}

impl<'s> RowEnv<'s> {
    pub fn single(frame: &'s Frame, row_var: &str, outer: &'s [Scope]) -> Self {
        RowEnv {
            sources: vec![(&frame.scope, &frame.schema, DlExpr::var(row_var))],
            outer,
        }
    }

    /// Two rows side by side, as in a non-equi join condition
    pub fn pair(
        left: &'s Frame,
        left_var: &str,
        right: &'s Frame,
        right_var: &str,
        outer: &'s [Scope],
    ) -> Self {
        RowEnv {
            sources: vec![
                (&left.scope, &left.schema, DlExpr::var(left_var)),
                (&right.scope, &right.schema, DlExpr::var(right_var)),
            ],
            outer,
        }
    }
}

impl ScalarEnv for RowEnv<'_> {
    fn column(&mut self, table: Option<&str>, name: &str) -> CompileResult<Typed> {
        let mut hits = Vec::new();
        for (scope, schema, row) in &self.sources {
            if let Some(field) = scope.resolve(table, name)? {
                hits.push((*schema, row, field));
            }
        }
        match hits.as_slice() {
            [] => Err(unresolved(table, name, self.outer)),
            [(schema, row, field)] => {
                let column = schema.column(*field);
                Ok(Typed::leaf(
                    (*row).clone().field(&column.name),
                    column.data_type,
                    column.nullable,
                ))
            }
            _ => Err(CompileError::ambiguous_column(qualified_name(table, name))),
        }
    }
}
