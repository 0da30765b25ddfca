//! Grouping and aggregation.
//!
//! A grouped SELECT compiles to a fold function over `Group<K, Row>` plus a
//! rule that groups the input rows and calls it:
//!
//! ```text
//! function agg(g: Group<K, TRow>):TRtmp {
//! var key = g.key();
//! var count = 64'sd0: signed<64>;
//! (for ((i, _) in g) {
//! var v1 = i;
//! ...}
//! );
//! (TRtmp{...})
//! }
//!
//! R[v3] :- <input>,var groupResult = (v1).group_by(k),var aggResult = agg(groupResult),var v2 = aggResult.
//! ```
//!
//! HAVING is checked on the fold result. Aggregates or keys it needs that
//! are not in the select list are computed as extra fields and projected
//! away afterwards.

use super::expr::{resolve_field, translate, RowEnv, ScalarEnv};
use super::{output_name, star_qualifier, CompileContext, Frame, QueryOutput};
use crate::ast::{AggregateFunc, Expr, Query, SelectItem};
use crate::config::Config;
use crate::error::{CompileError, CompileResult};
use crate::ir::{BodyItem, DlBinOp, DlExpr, DlLiteral, DlType, FunctionDecl, Stmt};
use crate::naming::{sanitize_field, NameAllocator};
use crate::null_semantics::{admit, lower, Typed};
use crate::schema::{qualified_name, ColumnSchema, DataType, RowSchema, Scope};
use tracing::debug;

const GROUP_VAR: &str = "g";
const ITEM_VAR: &str = "i";
const KEY_VAR: &str = "key";

/// Field indices of the GROUP BY keys, duplicates removed
fn group_keys(frame: &Frame, query: &Query, outer: &[Scope]) -> CompileResult<Vec<usize>> {
    let mut keys = Vec::new();
    for key in &query.group_by {
        let Some((table, name)) = key.as_column() else {
            return Err(CompileError::unsupported(
                key.to_string(),
                "GROUP BY keys must be column references",
            ));
        };
        let field = resolve_field(&frame.scope, table, name, outer)?;
        if !keys.contains(&field) {
            keys.push(field);
        }
    }
    Ok(keys)
}

fn zero() -> DlExpr {
    DlExpr::Literal(DlLiteral::Signed { width: 64, value: 0 })
}

fn helper_tag(nullable: bool) -> &'static str {
    if nullable {
        "N"
    } else {
        "R"
    }
}

// ============================================================================
// GROUP BY without aggregates
// ============================================================================

/// Row environment that only admits group keys
struct KeyCheck<'f> {
    frame: &'f Frame,
    row_var: String,
    keys: Vec<usize>,
    outer: &'f [Scope],
}

impl ScalarEnv for KeyCheck<'_> {
    fn column(&mut self, table: Option<&str>, name: &str) -> CompileResult<Typed> {
        let field = resolve_field(&self.frame.scope, table, name, self.outer)?;
        if !self.keys.contains(&field) {
            return Err(CompileError::ungrouped_column(qualified_name(table, name)));
        }
        let column = self.frame.schema.column(field);
        Ok(Typed::leaf(
            DlExpr::var(&self.row_var).field(&column.name),
            column.data_type,
            column.nullable,
        ))
    }
}

/// Check that a grouped query without aggregates selects only group keys.
///
/// The query then compiles as a plain projection.
pub fn validate_grouping(
    ctx: &mut CompileContext<'_>,
    frame: &mut Frame,
    query: &Query,
    outer: &[Scope],
) -> CompileResult<()> {
    let keys = group_keys(frame, query, outer)?;
    let row_var = frame.ensure_row_var(ctx)?;
    let frame: &Frame = frame;
    for item in &query.select {
        match item {
            SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                let qualifier = star_qualifier(item, &frame.scope)?;
                if let Some(entry) = frame
                    .scope
                    .star_entries(qualifier)
                    .into_iter()
                    .find(|e| !keys.contains(&e.field))
                {
                    return Err(CompileError::ungrouped_column(qualified_name(
                        entry.qualifier.as_deref(),
                        &entry.name,
                    )));
                }
            }
            SelectItem::Expr { expr, .. } => {
                let mut env = KeyCheck {
                    frame,
                    row_var: row_var.clone(),
                    keys: keys.clone(),
                    outer,
                };
                translate(expr, &mut env)?;
            }
        }
    }
    Ok(())
}

// ============================================================================
// Fold function
// ============================================================================

/// Builds the body of a fold function while select items are translated
struct FoldBuilder<'f> {
    frame: &'f Frame,
    row_var: String,
    outer: &'f [Scope],
    keys: Vec<usize>,
    null_aware: bool,
    locals: NameAllocator,
    accumulators: Vec<Stmt>,
    steps: Vec<Stmt>,
    computed: Vec<(Expr, Typed)>,
}

impl<'f> FoldBuilder<'f> {
    fn new(frame: &'f Frame, row_var: String, outer: &'f [Scope], keys: Vec<usize>, config: &Config) -> Self {
        let mut locals = NameAllocator::new(&config.naming);
        for reserved in [GROUP_VAR, ITEM_VAR, KEY_VAR, row_var.as_str()] {
            locals.reserve(reserved);
        }
        FoldBuilder {
            frame,
            row_var,
            outer,
            keys,
            null_aware: config.semantics.null_aware_operators,
            locals,
            accumulators: Vec::new(),
            steps: Vec::new(),
            computed: Vec::new(),
        }
    }

    /// Value of key field `field` inside the function
    fn key_value(&self, field: usize, shown_as: &str) -> CompileResult<Typed> {
        let position = self
            .keys
            .iter()
            .position(|k| *k == field)
            .ok_or_else(|| CompileError::ungrouped_column(shown_as))?;
        let key = DlExpr::var(KEY_VAR);
        let expr = if self.keys.len() == 1 {
            key
        } else {
            DlExpr::TupleField(Box::new(key), position)
        };
        let column = self.frame.schema.column(field);
        Ok(Typed::leaf(expr, column.data_type, column.nullable))
    }

    fn key_type(&self) -> DlType {
        let schema = &self.frame.schema;
        match self.keys.as_slice() {
            [] => DlType::Unit,
            [key] => schema.column(*key).dl_type(),
            keys => DlType::Tuple(keys.iter().map(|k| schema.column(*k).dl_type()).collect()),
        }
    }

    /// Grouping key as computed in the rule body
    fn group_key(&self) -> DlExpr {
        let field = |k: &usize| DlExpr::var(&self.row_var).field(&self.frame.schema.column(*k).name);
        match self.keys.as_slice() {
            [key] => field(key),
            keys => DlExpr::Tuple(keys.iter().map(field).collect()),
        }
    }

    fn accumulate(&mut self, func: AggregateFunc, arg: Option<&Expr>, construct: &str) -> CompileResult<Typed> {
        let acc = self.locals.fresh(func.as_str())?;
        let Some(arg) = arg else {
            self.accumulators.push(Stmt::VarDecl {
                name: acc.clone(),
                init: DlExpr::Ascribed(Box::new(zero()), DlType::Signed(64)),
            });
            self.steps.push(Stmt::Assign {
                target: acc.clone(),
                value: DlExpr::binary(
                    DlBinOp::Plus,
                    DlExpr::var(&acc),
                    DlExpr::Literal(DlLiteral::Signed { width: 64, value: 1 }),
                ),
            });
            return Ok(Typed::leaf(DlExpr::var(acc), DataType::BigInt, false));
        };

        let value = translate(arg, &mut RowEnv::single(self.frame, &self.row_var, self.outer))?;
        let Some(ty) = value.ty else {
            return Err(CompileError::unsupported(
                construct,
                "aggregate arguments need a typed value",
            ));
        };
        if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg) && !ty.is_numeric() {
            return Err(CompileError::type_mismatch(construct, ty, "numeric"));
        }
        let incr = self.locals.fresh("incr")?;
        let (init, result, result_ty, nullable) = match func {
            AggregateFunc::Count => (
                DlExpr::Ascribed(Box::new(zero()), DlType::Signed(64)),
                DlExpr::var(&acc),
                DataType::BigInt,
                false,
            ),
            AggregateFunc::Avg => (
                DlExpr::Ascribed(
                    Box::new(DlExpr::None),
                    DlType::Tuple(vec![ty.dl_type(), DlType::Signed(64)]).optional(),
                ),
                DlExpr::call("agg_avg_finish", vec![DlExpr::var(&acc)]),
                ty,
                true,
            ),
            AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max => (
                DlExpr::Ascribed(Box::new(DlExpr::None), ty.dl_type().optional()),
                DlExpr::var(&acc),
                ty,
                true,
            ),
        };
        self.accumulators.push(Stmt::VarDecl {
            name: acc.clone(),
            init,
        });
        self.steps.push(Stmt::ScopedVarDecl {
            name: incr.clone(),
            init: lower(&value, self.null_aware)?,
        });
        self.steps.push(Stmt::Assign {
            target: acc.clone(),
            value: DlExpr::call(
                format!("agg_{}_{}", func.as_str(), helper_tag(value.nullable)),
                vec![DlExpr::var(&acc), DlExpr::var(incr)],
            ),
        });
        Ok(Typed::leaf(result, result_ty, nullable))
    }

    fn finish(self, name: &str, result_type: &str, values: Vec<(String, DlExpr)>) -> FunctionDecl {
        let key_type = self.key_type();
        let mut body = Vec::new();
        if !self.keys.is_empty() {
            body.push(Stmt::VarDecl {
                name: KEY_VAR.to_string(),
                init: DlExpr::Method {
                    receiver: Box::new(DlExpr::var(GROUP_VAR)),
                    method: "key".to_string(),
                    args: Vec::new(),
                },
            });
        }
        body.extend(self.accumulators);
        let mut loop_body = vec![Stmt::VarDecl {
            name: self.row_var.clone(),
            init: DlExpr::var(ITEM_VAR),
        }];
        loop_body.extend(self.steps);
        body.push(Stmt::ForEachInGroup {
            group: GROUP_VAR.to_string(),
            item: ITEM_VAR.to_string(),
            body: loop_body,
        });
        FunctionDecl {
            name: name.to_string(),
            params: vec![(
                GROUP_VAR.to_string(),
                DlType::Group(
                    Box::new(key_type),
                    Box::new(DlType::Named(self.frame.type_name.clone())),
                ),
            )],
            return_type: DlType::Named(result_type.to_string()),
            body,
            result: DlExpr::Record {
                type_name: result_type.to_string(),
                fields: values,
            },
        }
    }
}

impl ScalarEnv for FoldBuilder<'_> {
    fn column(&mut self, table: Option<&str>, name: &str) -> CompileResult<Typed> {
        let field = resolve_field(&self.frame.scope, table, name, self.outer)?;
        self.key_value(field, &qualified_name(table, name))
    }

    fn aggregate(
        &mut self,
        call: &Expr,
        func: AggregateFunc,
        arg: Option<&Expr>,
        distinct: bool,
    ) -> CompileResult<Typed> {
        if let Some((_, typed)) = self.computed.iter().find(|(seen, _)| seen == call) {
            return Ok(typed.clone());
        }
        let construct = call.to_string();
        if distinct {
            return Err(CompileError::unsupported(
                construct,
                "DISTINCT aggregates are not supported",
            ));
        }
        let typed = self.accumulate(func, arg, &construct)?;
        self.computed.push((call.clone(), typed.clone()));
        Ok(typed)
    }
}

// ============================================================================
// HAVING
// ============================================================================

/// Result field that HAVING may read instead of recomputing
enum Reusable {
    Key { field: usize, index: usize },
    Aggregate { call: Expr, index: usize },
}

/// Resolves HAVING against the fields of the fold result `agg_var`
struct HavingEnv<'a, 'f> {
    fold: &'a mut FoldBuilder<'f>,
    schema: &'a mut RowSchema,
    values: &'a mut Vec<(String, DlExpr)>,
    reusable: &'a mut Vec<Reusable>,
    agg_var: &'a str,
    max_suffix: u32,
}

impl HavingEnv<'_, '_> {
    fn read(&self, index: usize) -> Typed {
        let column = self.schema.column(index);
        Typed::leaf(
            DlExpr::var(self.agg_var).field(&column.name),
            column.data_type,
            column.nullable,
        )
    }

    /// Add a result field that only HAVING reads
    fn hidden(&mut self, name: &str, typed: &Typed) -> CompileResult<usize> {
        let ty = typed.ty.unwrap_or(DataType::Boolean);
        let index = self
            .schema
            .push_unique(ColumnSchema::new(name, ty, typed.nullable), self.max_suffix)?;
        self.values.push((
            self.schema.column(index).name.clone(),
            lower(typed, self.fold.null_aware)?,
        ));
        Ok(index)
    }
}

impl ScalarEnv for HavingEnv<'_, '_> {
    fn column(&mut self, table: Option<&str>, name: &str) -> CompileResult<Typed> {
        let field = resolve_field(&self.fold.frame.scope, table, name, self.fold.outer)?;
        let typed = self.fold.key_value(field, &qualified_name(table, name))?;
        let known = self.reusable.iter().find_map(|r| match r {
            Reusable::Key { field: f, index } if *f == field => Some(*index),
            _ => None,
        });
        let index = match known {
            Some(index) => index,
            None => {
                let index = self.hidden(&sanitize_field(name), &typed)?;
                self.reusable.push(Reusable::Key { field, index });
                index
            }
        };
        Ok(self.read(index))
    }

    fn aggregate(
        &mut self,
        call: &Expr,
        func: AggregateFunc,
        arg: Option<&Expr>,
        distinct: bool,
    ) -> CompileResult<Typed> {
        let known = self.reusable.iter().find_map(|r| match r {
            Reusable::Aggregate { call: c, index } if c == call => Some(*index),
            _ => None,
        });
        let index = match known {
            Some(index) => index,
            None => {
                let typed = self.fold.aggregate(call, func, arg, distinct)?;
                let index = self.hidden(func.as_str(), &typed)?;
                self.reusable.push(Reusable::Aggregate {
                    call: call.clone(),
                    index,
                });
                index
            }
        };
        Ok(self.read(index))
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Compile a grouped SELECT block with aggregates and/or HAVING
pub fn compile_aggregate(
    ctx: &mut CompileContext<'_>,
    mut frame: Frame,
    query: &Query,
    hint: Option<&str>,
    outer: &[Scope],
) -> CompileResult<QueryOutput> {
    let keys = group_keys(&frame, query, outer)?;
    let row_var = frame.ensure_row_var(ctx)?;
    let null_aware = ctx.null_aware();
    let max_suffix = ctx.max_suffix();
    let config = ctx.config;

    let mut fold = FoldBuilder::new(&frame, row_var, outer, keys, config);
    let mut schema = RowSchema::new();
    let mut values = Vec::new();
    let mut reusable = Vec::new();

    for (position, item) in query.select.iter().enumerate() {
        match item {
            SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                let qualifier = star_qualifier(item, &frame.scope)?;
                for entry in frame.scope.star_entries(qualifier) {
                    let shown = qualified_name(entry.qualifier.as_deref(), &entry.name);
                    let typed = fold.key_value(entry.field, &shown)?;
                    let column = frame.schema.column(entry.field);
                    let index = schema.push_unique(
                        ColumnSchema::new(sanitize_field(&entry.name), column.data_type, column.nullable),
                        max_suffix,
                    )?;
                    values.push((schema.column(index).name.clone(), lower(&typed, null_aware)?));
                    reusable.push(Reusable::Key {
                        field: entry.field,
                        index,
                    });
                }
            }
            SelectItem::Expr { expr, alias } => {
                let typed = translate(expr, &mut fold)?;
                let Some(ty) = typed.ty else {
                    return Err(CompileError::unsupported(
                        expr.to_string(),
                        "a NULL literal needs a typed context",
                    ));
                };
                let name = output_name(expr, alias.as_deref(), position)?;
                let index = schema.push_unique(ColumnSchema::new(name, ty, typed.nullable), max_suffix)?;
                values.push((schema.column(index).name.clone(), lower(&typed, null_aware)?));
                match expr {
                    Expr::Column { table, name } => reusable.push(Reusable::Key {
                        field: resolve_field(&frame.scope, table.as_deref(), name, outer)?,
                        index,
                    }),
                    Expr::Aggregate { .. } => reusable.push(Reusable::Aggregate {
                        call: expr.clone(),
                        index,
                    }),
                    _ => {}
                }
            }
        }
    }

    let visible = schema.clone();
    let agg_var = ctx.names.fresh_variable()?;
    let mut conditions = Vec::new();
    if let Some(having) = &query.having {
        let mut env = HavingEnv {
            fold: &mut fold,
            schema: &mut schema,
            values: &mut values,
            reusable: &mut reusable,
            agg_var: &agg_var,
            max_suffix,
        };
        let typed = translate(having, &mut env)?;
        conditions.extend(admit(&typed, null_aware, &having.to_string())?);
    }

    let result_type = ctx.names.fresh_projection_type(hint)?;
    ctx.declare_type(&result_type, &schema);
    let function_name = ctx.names.fresh_function("agg")?;
    let group_var = ctx.names.fresh("groupResult")?;
    let result_var = ctx.names.fresh("aggResult")?;
    let group_key = fold.group_key();
    let function = fold.finish(&function_name, &result_type, values);
    debug!(function = %function_name, result = %result_type, "aggregate compiled");
    ctx.unit.functions.push(function);

    let (mut body, row_var) = frame.into_body(ctx)?;
    body.push(BodyItem::binding(
        &group_var,
        DlExpr::GroupBy {
            source: Box::new(DlExpr::var(row_var)),
            key: Box::new(group_key),
        },
    ));
    body.push(BodyItem::binding(
        &result_var,
        DlExpr::call(function_name, vec![DlExpr::var(&group_var)]),
    ));
    body.push(BodyItem::binding(&agg_var, DlExpr::var(&result_var)));
    body.extend(conditions.into_iter().map(BodyItem::Condition));

    if schema.len() == visible.len() {
        return Ok(QueryOutput {
            body,
            row_var: agg_var,
            type_name: result_type,
            schema,
        });
    }

    let projected_type = ctx.names.fresh_projection_type(hint)?;
    ctx.declare_type(&projected_type, &visible);
    let projected = ctx.names.fresh_variable()?;
    let fields = visible
        .columns()
        .iter()
        .map(|c| (c.name.clone(), DlExpr::var(&agg_var).field(&c.name)))
        .collect();
    body.push(BodyItem::binding(
        &projected,
        DlExpr::Record {
            type_name: projected_type.clone(),
            fields,
        },
    ));
    Ok(QueryOutput {
        body,
        row_var: projected,
        type_name: projected_type,
        schema: visible,
    })
}
