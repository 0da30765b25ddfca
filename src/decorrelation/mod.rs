//! # Derived Tables
//!
//! A subquery in FROM is compiled as a view of its own: its rows go to the
//! next temporary relation (`Rtmp`, `Rtmp0`, ...) with record type
//! `TR<alias>` (`TRtmp` when unaliased), and the enclosing query reads that
//! relation like a table.
//!
//! Subqueries may not refer to columns of the query that contains them.
//! The enclosing FROM items are passed down as outer scopes only so that
//! such a reference is reported as a correlated subquery rather than an
//! unknown column.

use crate::ast::{Query, TableExpr};
use crate::catalog::Catalog;
use crate::error::CompileResult;
use crate::ir::RelationRole;
use crate::ir_builder::{CompileContext, Frame, FrameSource};
use crate::naming::validate_identifier;
use crate::schema::{Scope, ScopeEntry};
use tracing::debug;

/// Compile `(query) AS alias` into a frame reading a temporary relation
pub fn compile_derived_table(
    ctx: &mut CompileContext<'_>,
    query: &Query,
    alias: Option<&str>,
    outer: &[Scope],
) -> CompileResult<Frame> {
    if let Some(alias) = alias {
        validate_identifier(alias)?;
    }
    let output = ctx.compile_query(query, alias, outer)?;
    let relation = ctx.names.fresh_temp_relation()?;
    let schema = output.schema.clone();
    let type_name = output.type_name.clone();
    ctx.emit_query_rule(output, &relation, RelationRole::Internal)?;
    debug!(relation = %relation, alias = ?alias, "derived table");

    Ok(Frame {
        scope: Scope::for_row(alias, &schema),
        schema,
        type_name,
        source: FrameSource::Relation {
            relation,
            row_var: None,
        },
    })
}

/// Columns of the base tables named in `from`, under their qualifiers.
///
/// Derived tables are skipped: their columns are not visible to siblings.
pub fn enclosing_scope(catalog: &Catalog, from: &[TableExpr]) -> Scope {
    let mut scope = Scope::new();
    for item in from {
        collect_tables(catalog, item, &mut scope);
    }
    scope
}

fn collect_tables(catalog: &Catalog, item: &TableExpr, scope: &mut Scope) {
    match item {
        TableExpr::Table { name, alias } => {
            let Some(table) = catalog.get(name) else {
                return;
            };
            let qualifier = alias.as_deref().unwrap_or(&table.name);
            for (field, column) in table.columns.iter().enumerate() {
                scope.push(ScopeEntry {
                    qualifier: Some(qualifier.to_string()),
                    name: column.name.clone(),
                    field,
                    qualified_only: false,
                });
            }
        }
        TableExpr::Derived { .. } => {}
        TableExpr::Join { left, right, .. } => {
            collect_tables(catalog, left, scope);
            collect_tables(catalog, right, scope);
        }
    }
}
