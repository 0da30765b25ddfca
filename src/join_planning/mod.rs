//! # Join Planning
//!
//! Turns two compiled FROM inputs into one frame.
//!
//! 1. Equi joins (`ON a = b AND ...`, `USING`, `NATURAL`, cross joins):
//!    both inputs are destructured in the rule body. Key columns that must be
//!    equal share one pattern variable, found through a union-find over the
//!    fields of both sides.
//! 2. Any other inner join condition: both rows are bound whole and the
//!    condition is checked as a body filter.
//! 3. LEFT / RIGHT joins: matched rows, plus preserved rows without a partner
//!    padded with `None{}`, collected in a temporary relation.
//!
//! ```text
//! Frame, Frame, JoinKind, JoinConstraint -> [Join Planning] -> Frame
//! ```
//!
//! Inputs that are rule-body fragments (results of earlier joins) are first
//! materialized into a temporary relation so they can appear as an atom.

use crate::ast::{BinaryOp, Expr, JoinConstraint, JoinKind};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Atom, BodyItem, DlBinOp, DlExpr, Pattern, RelationRole};
use crate::ir_builder::expr::{translate, RowEnv};
use crate::ir_builder::{CompileContext, Frame, FrameSource, QueryOutput};
use crate::null_semantics::{self as ns, admit, into_field, Typed};
use crate::schema::{ColumnSchema, RowSchema, Scope, ScopeEntry};
use std::collections::HashMap;
use tracing::debug;

/// Pairs of (left field, right field) that must be equal
type KeyPairs = Vec<(usize, usize)>;

/// Join two frames
pub fn compile_join(
    ctx: &mut CompileContext<'_>,
    left: Frame,
    right: Frame,
    kind: JoinKind,
    constraint: &JoinConstraint,
    outer: &[Scope],
) -> CompileResult<Frame> {
    match kind {
        JoinKind::Full => Err(CompileError::unsupported(
            "FULL JOIN",
            "full outer joins are not supported",
        )),
        JoinKind::Left => outer_join(ctx, left, right, true, constraint, outer),
        JoinKind::Right => outer_join(ctx, left, right, false, constraint, outer),
        JoinKind::Inner | JoinKind::Cross => match constraint {
            JoinConstraint::None => equi_join(ctx, left, right, &[], false),
            JoinConstraint::Natural => {
                let keys = natural_keys(&left, &right)?;
                equi_join(ctx, left, right, &keys, true)
            }
            JoinConstraint::Using(columns) => {
                let keys = using_keys(&left, &right, columns)?;
                equi_join(ctx, left, right, &keys, true)
            }
            JoinConstraint::On(on) => match equi_keys(&left, &right, on)? {
                Some(keys) => equi_join(ctx, left, right, &keys, false),
                None => filter_join(ctx, left, right, on, outer),
            },
        },
    }
}

// ============================================================================
// Key extraction
// ============================================================================

fn check_key_types(left: &Frame, right: &Frame, (l, r): (usize, usize), construct: &str) -> CompileResult<()> {
    let (lt, rt) = (left.schema.column(l).data_type, right.schema.column(r).data_type);
    if lt == rt {
        Ok(())
    } else {
        Err(CompileError::type_mismatch(construct, lt, rt))
    }
}

/// Key pairs of an ON condition made only of `left_col = right_col` conjuncts.
///
/// `Ok(None)` when the condition has any other shape.
fn equi_keys(left: &Frame, right: &Frame, on: &Expr) -> CompileResult<Option<KeyPairs>> {
    let mut keys = Vec::new();
    for conjunct in on.conjuncts() {
        let Expr::Binary {
            op: BinaryOp::Eq,
            left: a,
            right: b,
        } = conjunct
        else {
            return Ok(None);
        };
        let (Some(a), Some(b)) = (a.as_column(), b.as_column()) else {
            return Ok(None);
        };
        let pair = match (side_of(left, right, a), side_of(left, right, b)) {
            (Some(Side::Left(l)), Some(Side::Right(r))) | (Some(Side::Right(r)), Some(Side::Left(l))) => (l, r),
            _ => return Ok(None),
        };
        check_key_types(left, right, pair, &conjunct.to_string())?;
        keys.push(pair);
    }
    Ok(Some(keys))
}

enum Side {
    Left(usize),
    Right(usize),
}

/// Which input alone resolves the column; ambiguity counts as neither
fn side_of(left: &Frame, right: &Frame, (table, name): (Option<&str>, &str)) -> Option<Side> {
    match (left.scope.resolve(table, name), right.scope.resolve(table, name)) {
        (Ok(Some(l)), Ok(None)) => Some(Side::Left(l)),
        (Ok(None), Ok(Some(r))) => Some(Side::Right(r)),
        _ => None,
    }
}

fn natural_keys(left: &Frame, right: &Frame) -> CompileResult<KeyPairs> {
    let mut names: Vec<String> = Vec::new();
    for entry in left.scope.star_entries(None) {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&entry.name)) {
            names.push(entry.name.clone());
        }
    }
    let mut keys = Vec::new();
    for name in names {
        let Some(r) = right.scope.resolve(None, &name)? else {
            continue;
        };
        let Some(l) = left.scope.resolve(None, &name)? else {
            continue;
        };
        check_key_types(left, right, (l, r), &format!("NATURAL JOIN column {name}"))?;
        keys.push((l, r));
    }
    Ok(keys)
}

fn using_keys(left: &Frame, right: &Frame, columns: &[String]) -> CompileResult<KeyPairs> {
    columns
        .iter()
        .map(|name| {
            let l = left
                .scope
                .resolve(None, name)?
                .ok_or_else(|| CompileError::unknown_column(name.clone()))?;
            let r = right
                .scope
                .resolve(None, name)?
                .ok_or_else(|| CompileError::unknown_column(name.clone()))?;
            check_key_types(left, right, (l, r), &format!("USING ({name})"))?;
            Ok((l, r))
        })
        .collect()
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Turn a body fragment into a temporary relation; returns the frame
/// reading it and the relation name
fn materialize(ctx: &mut CompileContext<'_>, frame: Frame) -> CompileResult<(Frame, String)> {
    if let FrameSource::Relation { relation, .. } = &frame.source {
        let relation = relation.clone();
        return Ok((frame, relation));
    }
    let (schema, type_name, scope) = (frame.schema.clone(), frame.type_name.clone(), frame.scope.clone());
    let (body, row_var) = frame.into_body(ctx)?;
    let relation = ctx.names.fresh_temp_relation()?;
    ctx.emit_query_rule(
        QueryOutput {
            body,
            row_var,
            type_name: type_name.clone(),
            schema: schema.clone(),
        },
        &relation,
        RelationRole::Internal,
    )?;
    debug!(relation = %relation, "materialized join input");
    Ok((
        Frame {
            schema,
            type_name,
            scope,
            source: FrameSource::Relation {
                relation: relation.clone(),
                row_var: None,
            },
        },
        relation,
    ))
}

/// Scope of a merged row: the left scope as is, right entries remapped
fn merge_scope(left: &Scope, right: &Scope, right_map: &[usize], hidden: &[usize]) -> Scope {
    let mut scope = left.clone();
    for entry in right.entries() {
        scope.push(ScopeEntry {
            field: right_map[entry.field],
            qualified_only: entry.qualified_only || hidden.contains(&entry.field),
            ..entry.clone()
        });
    }
    scope
}

/// Declare a merged row type, reusing `reuse` when the rows are identical
fn merged_type(
    ctx: &mut CompileContext<'_>,
    schema: &RowSchema,
    reuse: Option<(&RowSchema, &str)>,
) -> CompileResult<String> {
    if let Some((same, name)) = reuse {
        if same == schema {
            return Ok(name.to_string());
        }
    }
    let name = ctx.names.fresh_merge_type()?;
    ctx.declare_type(&name, schema);
    Ok(name)
}

// ============================================================================
// Equi joins
// ============================================================================

/// Equivalence classes of key fields. Left field `i` is node `i`, right
/// field `j` is node `left_len + j`.
struct KeyClasses {
    parent: Vec<usize>,
    is_key: Vec<bool>,
}

impl KeyClasses {
    fn new(nodes: usize) -> Self {
        KeyClasses {
            parent: (0..nodes).collect(),
            is_key: vec![false; nodes],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        self.is_key[a] = true;
        self.is_key[b] = true;
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}

/// Pattern variable bound to one field
struct Bound {
    var: String,
    pattern: Pattern,
    /// Whether the variable holds an optional value
    nullable: bool,
}

fn destructure(
    ctx: &mut CompileContext<'_>,
    classes: &mut KeyClasses,
    class_vars: &mut HashMap<usize, String>,
    offset: usize,
    schema: &RowSchema,
) -> CompileResult<Vec<Bound>> {
    let mut bound = Vec::with_capacity(schema.len());
    for (i, column) in schema.columns().iter().enumerate() {
        let node = offset + i;
        if !classes.is_key[node] {
            let var = ctx.names.fresh_pattern_variable(&column.name)?;
            bound.push(Bound {
                pattern: Pattern::Var(var.clone()),
                var,
                nullable: column.nullable,
            });
            continue;
        }
        let root = classes.find(node);
        let var = match class_vars.get(&root) {
            Some(var) => var.clone(),
            None => {
                let var = ctx.names.fresh_pattern_variable(&column.name)?;
                class_vars.insert(root, var.clone());
                var
            }
        };
        let pattern = if column.nullable {
            Pattern::Some(Box::new(Pattern::Var(var.clone())))
        } else {
            Pattern::Var(var.clone())
        };
        bound.push(Bound {
            var,
            pattern,
            nullable: false,
        });
    }
    Ok(bound)
}

fn record_atom(relation: String, frame: &Frame, bound: &[Bound]) -> Atom {
    let fields = frame
        .schema
        .columns()
        .iter()
        .zip(bound)
        .map(|(column, b)| (column.name.clone(), b.pattern.clone()))
        .collect();
    Atom::new(
        relation,
        Pattern::Record {
            type_name: frame.type_name.clone(),
            fields,
        },
    )
}

fn equi_join(
    ctx: &mut CompileContext<'_>,
    left: Frame,
    right: Frame,
    keys: &[(usize, usize)],
    hide_right_keys: bool,
) -> CompileResult<Frame> {
    let (left, left_relation) = materialize(ctx, left)?;
    let (right, right_relation) = materialize(ctx, right)?;
    debug!(left = %left_relation, right = %right_relation, keys = keys.len(), "equi join");

    let left_len = left.schema.len();
    let mut classes = KeyClasses::new(left_len + right.schema.len());
    for &(l, r) in keys {
        classes.union(l, left_len + r);
    }

    let mut class_vars = HashMap::new();
    let left_bound = destructure(ctx, &mut classes, &mut class_vars, 0, &left.schema)?;
    let right_bound = destructure(ctx, &mut classes, &mut class_vars, left_len, &right.schema)?;

    let mut schema = left.schema.clone();
    let mut values: Vec<(String, DlExpr)> = left
        .schema
        .columns()
        .iter()
        .zip(&left_bound)
        .map(|(column, b)| {
            (
                column.name.clone(),
                into_field(DlExpr::var(&b.var), b.nullable, column.nullable),
            )
        })
        .collect();

    let mut right_map = Vec::with_capacity(right.schema.len());
    for (j, (column, b)) in right.schema.columns().iter().zip(&right_bound).enumerate() {
        let node = left_len + j;
        if classes.is_key[node] {
            let root = classes.find(node);
            let twin = (0..left_len).find(|&i| {
                let candidate = left.schema.column(i);
                classes.is_key[i]
                    && classes.find(i) == root
                    && candidate.data_type == column.data_type
                    && candidate.nullable == column.nullable
            });
            if let Some(i) = twin {
                right_map.push(i);
                continue;
            }
        }
        let idx = schema.push_unique(column.clone(), ctx.max_suffix())?;
        values.push((
            schema.column(idx).name.clone(),
            into_field(DlExpr::var(&b.var), b.nullable, column.nullable),
        ));
        right_map.push(idx);
    }

    let hidden: Vec<usize> = if hide_right_keys {
        keys.iter().map(|&(_, r)| r).collect()
    } else {
        Vec::new()
    };
    let scope = merge_scope(&left.scope, &right.scope, &right_map, &hidden);
    let type_name = merged_type(ctx, &schema, Some((&left.schema, &left.type_name)))?;

    let row_var = ctx.names.fresh_variable()?;
    let body = vec![
        BodyItem::Atom(record_atom(left_relation, &left, &left_bound)),
        BodyItem::Atom(record_atom(right_relation, &right, &right_bound)),
        BodyItem::binding(
            &row_var,
            DlExpr::Record {
                type_name: type_name.clone(),
                fields: values,
            },
        ),
    ];
    Ok(Frame {
        schema,
        type_name,
        scope,
        source: FrameSource::Derived { body, row_var },
    })
}

// ============================================================================
// Filter joins
// ============================================================================

fn filter_join(
    ctx: &mut CompileContext<'_>,
    left: Frame,
    right: Frame,
    on: &Expr,
    outer: &[Scope],
) -> CompileResult<Frame> {
    let (mut left, left_relation) = materialize(ctx, left)?;
    let (mut right, right_relation) = materialize(ctx, right)?;
    let lv = left.ensure_row_var(ctx)?;
    let rv = right.ensure_row_var(ctx)?;
    debug!(left = %left_relation, right = %right_relation, "filter join");

    let typed = translate(on, &mut RowEnv::pair(&left, &lv, &right, &rv, outer))?;
    let condition = admit(&typed, ctx.null_aware(), &on.to_string())?;

    let mut schema = left.schema.clone();
    let mut values: Vec<(String, DlExpr)> = left
        .schema
        .columns()
        .iter()
        .map(|c| (c.name.clone(), DlExpr::var(&lv).field(&c.name)))
        .collect();
    let mut right_map = Vec::with_capacity(right.schema.len());
    for column in right.schema.columns() {
        let idx = schema.push_unique(column.clone(), ctx.max_suffix())?;
        values.push((schema.column(idx).name.clone(), DlExpr::var(&rv).field(&column.name)));
        right_map.push(idx);
    }
    let scope = merge_scope(&left.scope, &right.scope, &right_map, &[]);
    let type_name = merged_type(ctx, &schema, None)?;

    let row_var = ctx.names.fresh_variable()?;
    let mut body = vec![
        BodyItem::Atom(Atom::row(left_relation, &lv)),
        BodyItem::Atom(Atom::row(right_relation, &rv)),
    ];
    body.extend(condition.map(BodyItem::Condition));
    body.push(BodyItem::binding(
        &row_var,
        DlExpr::Record {
            type_name: type_name.clone(),
            fields: values,
        },
    ));
    Ok(Frame {
        schema,
        type_name,
        scope,
        source: FrameSource::Derived { body, row_var },
    })
}

// ============================================================================
// Outer joins
// ============================================================================

/// Conjunction of `lv.l = rv.r` over the key pairs
fn key_condition(left: &Frame, lv: &str, right: &Frame, rv: &str, keys: &[(usize, usize)], construct: &str) -> CompileResult<Typed> {
    let mut condition = Typed::truth(ns::Truth::True);
    for &(l, r) in keys {
        let (lc, rc) = (left.schema.column(l), right.schema.column(r));
        let eq = ns::compare(
            DlBinOp::Eq,
            Typed::leaf(DlExpr::var(lv).field(&lc.name), lc.data_type, lc.nullable),
            Typed::leaf(DlExpr::var(rv).field(&rc.name), rc.data_type, rc.nullable),
            construct,
        )?;
        condition = ns::logical(DlBinOp::And, condition, eq, construct)?;
    }
    Ok(condition)
}

fn record_values(
    row_var: Option<&str>,
    source: &RowSchema,
    target: &RowSchema,
    fields: &[usize],
) -> Vec<(String, DlExpr)> {
    source
        .columns()
        .iter()
        .zip(fields)
        .map(|(column, &idx)| {
            let field = target.column(idx);
            let value = match row_var {
                Some(v) => into_field(DlExpr::var(v).field(&column.name), column.nullable, field.nullable),
                None => DlExpr::None,
            };
            (field.name.clone(), value)
        })
        .collect()
}

fn outer_join(
    ctx: &mut CompileContext<'_>,
    left: Frame,
    right: Frame,
    preserve_left: bool,
    constraint: &JoinConstraint,
    outer: &[Scope],
) -> CompileResult<Frame> {
    let join = if preserve_left { "LEFT JOIN" } else { "RIGHT JOIN" };
    let (mut left, left_relation) = materialize(ctx, left)?;
    let (mut right, right_relation) = materialize(ctx, right)?;
    let lv = left.ensure_row_var(ctx)?;
    let rv = right.ensure_row_var(ctx)?;

    let (typed, construct, hidden) = match constraint {
        JoinConstraint::On(on) => {
            let construct = on.to_string();
            (
                translate(on, &mut RowEnv::pair(&left, &lv, &right, &rv, outer))?,
                construct,
                Vec::new(),
            )
        }
        JoinConstraint::Using(columns) => {
            let keys = using_keys(&left, &right, columns)?;
            let construct = format!("{join} USING ({})", columns.join(", "));
            let typed = key_condition(&left, &lv, &right, &rv, &keys, &construct)?;
            (typed, construct, keys.iter().map(|&(_, r)| r).collect())
        }
        JoinConstraint::Natural => {
            let keys = natural_keys(&left, &right)?;
            let construct = format!("NATURAL {join}");
            let typed = key_condition(&left, &lv, &right, &rv, &keys, &construct)?;
            (typed, construct, keys.iter().map(|&(_, r)| r).collect())
        }
        JoinConstraint::None => {
            return Err(CompileError::unsupported(join, "outer joins need a join condition"))
        }
    };
    let condition = admit(&typed, ctx.null_aware(), &construct)?;

    let mut schema = RowSchema::new();
    let mut left_fields = Vec::with_capacity(left.schema.len());
    for column in left.schema.columns() {
        let padded = column.with_nullable(column.nullable || !preserve_left);
        left_fields.push(schema.push_unique(padded, ctx.max_suffix())?);
    }
    let mut right_fields = Vec::with_capacity(right.schema.len());
    for column in right.schema.columns() {
        let padded: ColumnSchema = column.with_nullable(column.nullable || preserve_left);
        right_fields.push(schema.push_unique(padded, ctx.max_suffix())?);
    }
    let scope = merge_scope(&left.scope, &right.scope, &right_fields, &hidden);
    let type_name = merged_type(ctx, &schema, None)?;

    let out = ctx.names.fresh_temp_relation()?;
    ctx.declare_relation(&out, RelationRole::Internal, &type_name);
    let (preserved, preserved_relation, pv) = if preserve_left {
        (&left, &left_relation, &lv)
    } else {
        (&right, &right_relation, &rv)
    };
    let matched = ctx.names.fresh_temp_relation()?;
    ctx.declare_relation(&matched, RelationRole::Internal, &preserved.type_name);
    debug!(join = join, out = %out, matched = %matched, "outer join");

    let both = vec![
        BodyItem::Atom(Atom::row(&left_relation, &lv)),
        BodyItem::Atom(Atom::row(&right_relation, &rv)),
    ];

    let matched_var = ctx.names.fresh_variable()?;
    let mut fields = record_values(Some(&lv), &left.schema, &schema, &left_fields);
    fields.extend(record_values(Some(&rv), &right.schema, &schema, &right_fields));
    let mut body = both.clone();
    body.extend(condition.clone().map(BodyItem::Condition));
    body.push(BodyItem::binding(
        &matched_var,
        DlExpr::Record {
            type_name: type_name.clone(),
            fields,
        },
    ));
    ctx.emit_rule(Atom::row(&out, &matched_var), body);

    let mut body = both;
    body.extend(condition.map(BodyItem::Condition));
    ctx.emit_rule(Atom::row(&matched, pv.as_str()), body);

    let unmatched_var = ctx.names.fresh_variable()?;
    let (left_var, right_var) = if preserve_left {
        (Some(lv.as_str()), None)
    } else {
        (None, Some(rv.as_str()))
    };
    let mut fields = record_values(left_var, &left.schema, &schema, &left_fields);
    fields.extend(record_values(right_var, &right.schema, &schema, &right_fields));
    let body = vec![
        BodyItem::Atom(Atom::row(preserved_relation.as_str(), pv.as_str())),
        BodyItem::Negated(Atom::row(&matched, pv.as_str())),
        BodyItem::binding(
            &unmatched_var,
            DlExpr::Record {
                type_name: type_name.clone(),
                fields,
            },
        ),
    ];
    ctx.emit_rule(Atom::row(&out, &unmatched_var), body);

    Ok(Frame {
        schema,
        type_name,
        scope,
        source: FrameSource::Relation {
            relation: out,
            row_var: None,
        },
    })
}
