//! # IR Builder
//!
//! Walks a view's query tree and builds the Datalog IR for it.
//!
//! ## Pipeline Position
//!
//! ```text
//! ViewDefinition (AST) → [IR Builder] → CompilationUnit → Code Generator
//! ```
//!
//! The FROM tree is visited bottom-up, left to right. Every node returns a
//! [`Frame`]: the row schema and record type of its output, the SQL names
//! that reach each field, and where the rows come from (a relation, or a
//! rule-body fragment ending in a binding of the row variable). Joins are
//! delegated to [`join_planning`](crate::join_planning), derived tables to
//! [`decorrelation`](crate::decorrelation) and grouping to [`aggregate`].
//!
//! All per-view state (name allocator, emitted declarations and rules) lives
//! in one [`CompileContext`] that is threaded through the walk.

pub mod aggregate;
pub mod expr;

use crate::ast::{Expr, JoinConstraint, JoinKind, Query, SelectItem, TableExpr, ViewDefinition};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::decorrelation;
use crate::error::{CompileError, CompileResult};
use crate::ir::{Atom, BodyItem, CompilationUnit, DlExpr, RelationDecl, RelationRole, Rule};
use crate::join_planning;
use crate::naming::{relation_name, sanitize_field, validate_identifier, NameAllocator};
use crate::null_semantics::{admit, lower};
use crate::schema::{ColumnSchema, RowSchema, Scope, ScopeEntry};
use expr::{translate, RowEnv};
use tracing::debug;

/// Where a frame's rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSource {
    /// Rows of a relation; the row variable is allocated on first use
    Relation {
        relation: String,
        row_var: Option<String>,
    },
    /// Rule-body fragment whose last binding names the row
    Derived { body: Vec<BodyItem>, row_var: String },
}

/// Output of a FROM node
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub schema: RowSchema,
    pub type_name: String,
    pub scope: Scope,
    pub source: FrameSource,
}

impl Frame {
    /// Row variable of this frame, allocating one for a relation if needed
    pub fn ensure_row_var(&mut self, ctx: &mut CompileContext<'_>) -> CompileResult<String> {
        match &mut self.source {
            FrameSource::Relation { row_var: Some(v), .. } | FrameSource::Derived { row_var: v, .. } => {
                Ok(v.clone())
            }
            FrameSource::Relation { row_var, .. } => {
                let v = ctx.names.fresh_variable()?;
                *row_var = Some(v.clone());
                Ok(v)
            }
        }
    }

    /// Relation name, for frames that read one
    pub fn relation(&self) -> Option<&str> {
        match &self.source {
            FrameSource::Relation { relation, .. } => Some(relation),
            FrameSource::Derived { .. } => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.source, FrameSource::Derived { .. })
    }

    /// Append a filter, turning a relation frame into a body fragment
    pub fn push_condition(&mut self, ctx: &mut CompileContext<'_>, condition: DlExpr) -> CompileResult<()> {
        let row_var = self.ensure_row_var(ctx)?;
        let source = std::mem::replace(
            &mut self.source,
            FrameSource::Derived {
                body: Vec::new(),
                row_var: row_var.clone(),
            },
        );
        let mut body = match source {
            FrameSource::Relation { relation, .. } => vec![BodyItem::Atom(Atom::row(relation, &row_var))],
            FrameSource::Derived { body, .. } => body,
        };
        body.push(BodyItem::Condition(condition));
        self.source = FrameSource::Derived { body, row_var };
        Ok(())
    }

    /// Body producing this frame's rows, and the variable holding each row
    pub fn into_body(mut self, ctx: &mut CompileContext<'_>) -> CompileResult<(Vec<BodyItem>, String)> {
        let row_var = self.ensure_row_var(ctx)?;
        Ok(match self.source {
            FrameSource::Relation { relation, .. } => {
                (vec![BodyItem::Atom(Atom::row(relation, &row_var))], row_var)
            }
            FrameSource::Derived { body, row_var } => (body, row_var),
        })
    }
}

/// A compiled SELECT block: body fragment, row variable, and row shape
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub body: Vec<BodyItem>,
    pub row_var: String,
    pub type_name: String,
    pub schema: RowSchema,
}

/// Per-view compilation state
pub struct CompileContext<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a Config,
    pub names: NameAllocator,
    pub unit: CompilationUnit,
}

impl<'a> CompileContext<'a> {
    /// Fresh context with every catalog relation and type name reserved
    pub fn new(catalog: &'a Catalog, config: &'a Config) -> Self {
        let mut names = NameAllocator::new(&config.naming);
        for table in catalog.tables() {
            names.reserve(table.relation_name());
            names.reserve(table.type_name());
        }
        CompileContext {
            catalog,
            config,
            names,
            unit: CompilationUnit::default(),
        }
    }

    pub fn null_aware(&self) -> bool {
        self.config.semantics.null_aware_operators
    }

    pub fn max_suffix(&self) -> u32 {
        self.config.naming.max_suffix
    }

    pub fn declare_type(&mut self, name: &str, schema: &RowSchema) {
        self.unit.types.push(schema.type_decl(name));
    }

    pub fn declare_relation(&mut self, name: &str, role: RelationRole, element_type: &str) {
        self.unit.relations.push(RelationDecl {
            name: name.to_string(),
            role,
            element_type: element_type.to_string(),
        });
    }

    pub fn emit_rule(&mut self, head: Atom, body: Vec<BodyItem>) {
        self.unit.rules.push(Rule { head, body });
    }

    /// Declare `relation` and emit `relation[vF] :- body,var vF = row.`
    pub fn emit_query_rule(
        &mut self,
        output: QueryOutput,
        relation: &str,
        role: RelationRole,
    ) -> CompileResult<()> {
        self.declare_relation(relation, role, &output.type_name);
        let final_var = self.names.fresh_variable()?;
        let mut body = output.body;
        body.push(BodyItem::binding(&final_var, DlExpr::var(output.row_var)));
        self.emit_rule(Atom::row(relation, final_var), body);
        Ok(())
    }

    /// Compile one SELECT block.
    ///
    /// `hint` names the generated projection type (`TR<hint>`); `outer` holds
    /// the scopes of enclosing queries, used only to detect correlation.
    pub fn compile_query(
        &mut self,
        query: &Query,
        hint: Option<&str>,
        outer: &[Scope],
    ) -> CompileResult<QueryOutput> {
        self.compile_query_inner(query, hint, outer)
            .map_err(|e| e.with_location(query.location))
    }

    fn compile_query_inner(
        &mut self,
        query: &Query,
        hint: Option<&str>,
        outer: &[Scope],
    ) -> CompileResult<QueryOutput> {
        let mut items = query.from.iter();
        let first = items.next().ok_or_else(|| {
            CompileError::unsupported(query.to_string(), "a query needs at least one FROM item")
        })?;

        let mut nested_outer = outer.to_vec();
        nested_outer.push(decorrelation::enclosing_scope(self.catalog, &query.from));

        let mut frame = self.compile_table_expr(first, &nested_outer)?;
        for item in items {
            let right = self.compile_table_expr(item, &nested_outer)?;
            frame = join_planning::compile_join(
                self,
                frame,
                right,
                JoinKind::Cross,
                &JoinConstraint::None,
                outer,
            )?;
        }

        if let Some(selection) = &query.selection {
            self.apply_filter(&mut frame, selection, outer)?;
        }

        if query.is_aggregate() {
            if query.has_aggregates() || query.having.is_some() {
                return aggregate::compile_aggregate(self, frame, query, hint, outer);
            }
            aggregate::validate_grouping(self, &mut frame, query, outer)?;
        }
        self.compile_projection(frame, query, hint, outer)
    }

    fn apply_filter(&mut self, frame: &mut Frame, predicate: &Expr, outer: &[Scope]) -> CompileResult<()> {
        let row_var = frame.ensure_row_var(self)?;
        let typed = translate(predicate, &mut RowEnv::single(frame, &row_var, outer))?;
        if let Some(condition) = admit(&typed, self.null_aware(), &predicate.to_string())? {
            frame.push_condition(self, condition)?;
        }
        Ok(())
    }

    /// Compile one FROM item into a frame
    pub fn compile_table_expr(&mut self, item: &TableExpr, outer: &[Scope]) -> CompileResult<Frame> {
        match item {
            TableExpr::Table { name, alias } => self.scan(name, alias.as_deref()),
            TableExpr::Derived { query, alias } => {
                decorrelation::compile_derived_table(self, query, alias.as_deref(), outer)
            }
            TableExpr::Join {
                left,
                right,
                kind,
                constraint,
            } => {
                let left = self.compile_table_expr(left, outer)?;
                let right = self.compile_table_expr(right, outer)?;
                join_planning::compile_join(self, left, right, *kind, constraint, outer)
            }
        }
    }

    fn scan(&mut self, name: &str, alias: Option<&str>) -> CompileResult<Frame> {
        let table = self.catalog.lookup(name)?;
        if let Some(alias) = alias {
            validate_identifier(alias)?;
        }
        let qualifier = alias.unwrap_or(&table.name).to_string();
        let schema = table.row_schema();
        let mut scope = Scope::new();
        for (field, column) in table.columns.iter().enumerate() {
            scope.push(ScopeEntry {
                qualifier: Some(qualifier.clone()),
                name: column.name.clone(),
                field,
                qualified_only: false,
            });
        }
        let (relation, type_name) = (table.relation_name(), table.type_name());
        let row_var = self.names.fresh_variable()?;
        Ok(Frame {
            schema,
            type_name,
            scope,
            source: FrameSource::Relation {
                relation,
                row_var: Some(row_var),
            },
        })
    }

    fn compile_projection(
        &mut self,
        mut frame: Frame,
        query: &Query,
        hint: Option<&str>,
        outer: &[Scope],
    ) -> CompileResult<QueryOutput> {
        let passthrough =
            query.is_select_star() && frame.scope.star_entries(None).len() == frame.schema.len();
        if passthrough {
            let type_name = frame.type_name.clone();
            let schema = frame.schema.clone();
            let (body, row_var) = frame.into_body(self)?;
            return Ok(QueryOutput {
                body,
                row_var,
                type_name,
                schema,
            });
        }

        let row_var = frame.ensure_row_var(self)?;
        let row = DlExpr::var(&row_var);
        let mut schema = RowSchema::new();
        let mut values = Vec::new();
        for (position, item) in query.select.iter().enumerate() {
            match item {
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                    let qualifier = star_qualifier(item, &frame.scope)?;
                    for entry in frame.scope.star_entries(qualifier) {
                        let column = frame.schema.column(entry.field);
                        let idx = schema.push_unique(
                            ColumnSchema::new(sanitize_field(&entry.name), column.data_type, column.nullable),
                            self.max_suffix(),
                        )?;
                        values.push((schema.column(idx).name.clone(), row.clone().field(&column.name)));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let typed = translate(expr, &mut RowEnv::single(&frame, &row_var, outer))?;
                    let Some(ty) = typed.ty else {
                        return Err(CompileError::unsupported(
                            expr.to_string(),
                            "a NULL literal needs a typed context",
                        ));
                    };
                    let value = lower(&typed, self.null_aware())?;
                    let name = output_name(expr, alias.as_deref(), position)?;
                    let idx = schema.push_unique(ColumnSchema::new(name, ty, typed.nullable), self.max_suffix())?;
                    values.push((schema.column(idx).name.clone(), value));
                }
            }
        }

        let type_name = self.names.fresh_projection_type(hint)?;
        self.declare_type(&type_name, &schema);
        let projected = self.names.fresh_variable()?;
        let (mut body, _) = frame.into_body(self)?;
        body.push(BodyItem::binding(
            &projected,
            DlExpr::Record {
                type_name: type_name.clone(),
                fields: values,
            },
        ));
        Ok(QueryOutput {
            body,
            row_var: projected,
            type_name,
            schema,
        })
    }
}

/// Qualifier of a `t.*` item, checked against the scope; `None` for `*`
pub(crate) fn star_qualifier<'i>(item: &'i SelectItem, scope: &Scope) -> CompileResult<Option<&'i str>> {
    match item {
        SelectItem::QualifiedWildcard(q) if !scope.has_qualifier(q) => {
            Err(CompileError::unknown_relation(q.clone()))
        }
        SelectItem::QualifiedWildcard(q) => Ok(Some(q.as_str())),
        _ => Ok(None),
    }
}

/// Field name of a select item: alias, column name, aggregate name or `col<N>`
pub(crate) fn output_name(expr: &Expr, alias: Option<&str>, position: usize) -> CompileResult<String> {
    if let Some(alias) = alias {
        validate_identifier(alias)?;
        return Ok(sanitize_field(alias));
    }
    Ok(match expr {
        Expr::Column { name, .. } => sanitize_field(name),
        Expr::Aggregate { func, .. } => func.as_str().to_string(),
        _ => format!("col{position}"),
    })
}

/// Compiles views against a catalog
pub struct QueryCompiler<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a Config) -> Self {
        QueryCompiler { catalog, config }
    }

    /// Compile `CREATE VIEW name AS query` into its own unit
    pub fn compile_view(&self, view: &ViewDefinition) -> CompileResult<CompilationUnit> {
        let span = tracing::debug_span!("compile_view", view = %view.name);
        let _enter = span.enter();

        validate_identifier(&view.name).map_err(|e| e.with_location(view.location))?;
        if self.catalog.has_table(&view.name) {
            return Err(CompileError::unsupported(
                format!("CREATE VIEW {}", view.name),
                "view name clashes with a catalog table",
            )
            .with_location(view.location));
        }

        let mut ctx = CompileContext::new(self.catalog, self.config);
        let output_relation = relation_name(&view.name);
        ctx.names.reserve(output_relation.clone());

        let output = ctx
            .compile_query(&view.query, None, &[])
            .map_err(|e| e.with_location(view.location))?;
        ctx.emit_query_rule(output, &output_relation, RelationRole::Output)
            .map_err(|e| e.with_location(view.query.location).with_location(view.location))?;

        let mut unit = ctx.unit;
        unit.view = view.name.clone();
        unit.output_relation = output_relation;
        debug!(
            types = unit.types.len(),
            relations = unit.relations.len(),
            rules = unit.rules.len(),
            "view compiled"
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;
    use crate::catalog::TableSchema;
    use crate::schema::DataType;

    fn catalog() -> Catalog {
        Catalog::from_tables([
            TableSchema::new(
                "t1",
                vec![
                    ColumnSchema::new("column1", DataType::BigInt, false),
                    ColumnSchema::new("column2", DataType::Varchar, false),
                    ColumnSchema::new("column3", DataType::Boolean, false),
                    ColumnSchema::new("column4", DataType::Double, false),
                ],
            ),
            TableSchema::new("t4", vec![ColumnSchema::new("column1", DataType::BigInt, true)]),
        ])
        .unwrap()
    }

    fn compile(view: &ViewDefinition) -> CompileResult<CompilationUnit> {
        let catalog = catalog();
        let config = Config::default();
        QueryCompiler::new(&catalog, &config).compile_view(view)
    }

    #[test]
    fn test_select_star_single_table() {
        let unit = compile(&QueryBuilder::new().select_all().from(table("t1")).view("v0")).unwrap();
        assert!(unit.types.is_empty());
        assert_eq!(unit.output_type(), Some("TRt1"));
        assert_eq!(unit.rules[0].to_string(), "Rv0[v0] :- Rt1[v],var v0 = v.");
    }

    #[test]
    fn test_projection_with_filter() {
        let unit = compile(
            &QueryBuilder::new()
                .select_as(col("column1"), "id")
                .from(table("t1"))
                .filter(col("column2").eq(lit_str("a")))
                .view("v0"),
        )
        .unwrap();
        assert_eq!(unit.types[0].to_string(), "typedef TRtmp = TRtmp{id:signed<64>}");
        assert_eq!(
            unit.rules[0].to_string(),
            "Rv0[v1] :- Rt1[v],(v.column2 == \"a\"),var v0 = TRtmp{.id = v.column1},var v1 = v0."
        );
    }

    #[test]
    fn test_where_true_adds_no_filter() {
        let unit = compile(
            &QueryBuilder::new()
                .select_all()
                .from(table("t1"))
                .filter(lit_bool(true))
                .view("v0"),
        )
        .unwrap();
        assert_eq!(unit.rules[0].to_string(), "Rv0[v0] :- Rt1[v],var v0 = v.");
    }

    #[test]
    fn test_where_null_rejects_everything() {
        let unit = compile(
            &QueryBuilder::new()
                .select_all()
                .from(table("t1"))
                .filter(null())
                .view("v0"),
        )
        .unwrap();
        assert_eq!(unit.rules[0].to_string(), "Rv0[v0] :- Rt1[v],false,var v0 = v.");
    }

    #[test]
    fn test_nullable_projection_expression() {
        let unit = compile(
            &QueryBuilder::new()
                .select(col("column1").plus(lit_int(1)))
                .from(table("t4"))
                .view("v0"),
        )
        .unwrap();
        assert_eq!(
            unit.types[0].to_string(),
            "typedef TRtmp = TRtmp{col0:Option<signed<64>>}"
        );
        assert!(unit.rules[0].to_string().contains("a_plus_NR(v.column1, 64'sd1)"));
    }

    #[test]
    fn test_empty_from_is_unsupported() {
        let err = compile(&QueryBuilder::new().select(lit_int(1)).view("v0")).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedConstruct");
    }

    #[test]
    fn test_view_name_clashing_with_table() {
        let err = compile(&QueryBuilder::new().select_all().from(table("t1")).view("t4")).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedConstruct");
    }

    #[test]
    fn test_qualified_star_with_unknown_qualifier() {
        let err = compile(
            &QueryBuilder::new()
                .select_all_from("zz")
                .from(table("t1"))
                .view("v0"),
        )
        .unwrap_err();
        assert_eq!(err, CompileError::unknown_relation("zz"));
    }
}
