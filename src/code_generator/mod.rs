//! # Code Generator
//!
//! Serializes compiled views as differential-Datalog program text.
//!
//! ## Pipeline Position
//!
//! ```text
//! CompilationUnit(s) -> [Code Generator] -> program text
//! ```
//!
//! A unit renders as its type declarations, fold functions, relation
//! declarations and rules, one per line, in the order they were introduced.
//! Rendering reads nothing but its arguments: the same units always give the
//! same bytes.

use crate::catalog::Catalog;
use crate::config::EmitConfig;
use crate::ir::CompilationUnit;

/// Program text emitter
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator {
    config: EmitConfig,
}

impl CodeGenerator {
    pub fn new(config: EmitConfig) -> Self {
        CodeGenerator { config }
    }

    /// Declarations and rules of one view
    pub fn render_unit(&self, unit: &CompilationUnit) -> String {
        let mut out = String::new();
        for ty in &unit.types {
            push_line(&mut out, ty);
        }
        for function in &unit.functions {
            push_line(&mut out, function);
        }
        for relation in &unit.relations {
            push_line(&mut out, relation);
        }
        for rule in &unit.rules {
            push_line(&mut out, rule);
        }
        out
    }

    /// Imports plus the catalog's record types and input relations
    pub fn render_prelude(&self, catalog: &Catalog) -> String {
        let mut out = String::new();
        for module in &self.config.imports {
            out.push_str("import ");
            out.push_str(module);
            out.push('\n');
        }
        if !self.config.imports.is_empty() {
            out.push('\n');
        }
        for table in catalog.tables() {
            push_line(&mut out, table.type_decl());
        }
        for table in catalog.tables() {
            push_line(&mut out, table.relation_decl());
        }
        out
    }

    /// Full program: the prelude (unless disabled) followed by every unit,
    /// sections separated by a blank line
    pub fn render_program<'u>(
        &self,
        catalog: &Catalog,
        units: impl IntoIterator<Item = &'u CompilationUnit>,
    ) -> String {
        let mut sections = Vec::new();
        if self.config.include_prelude {
            sections.push(self.render_prelude(catalog));
        }
        sections.extend(units.into_iter().map(|unit| self.render_unit(unit)));
        sections.join("\n")
    }
}

fn push_line(out: &mut String, item: impl std::fmt::Display) {
    out.push_str(&item.to_string());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableSchema;
    use crate::ir::{Atom, BodyItem, DlExpr, RelationDecl, RelationRole, Rule};
    use crate::schema::{ColumnSchema, DataType, RowSchema};

    fn catalog() -> Catalog {
        Catalog::from_tables([TableSchema::new(
            "t2",
            vec![ColumnSchema::new("column1", DataType::BigInt, false)],
        )])
        .unwrap()
    }

    fn unit() -> CompilationUnit {
        let schema = RowSchema::from_columns(vec![ColumnSchema::new("c", DataType::BigInt, false)]);
        CompilationUnit {
            view: "v0".to_string(),
            output_relation: "Rv0".to_string(),
            types: vec![schema.type_decl("TRtmp")],
            functions: vec![],
            relations: vec![RelationDecl {
                name: "Rv0".to_string(),
                role: RelationRole::Output,
                element_type: "TRtmp".to_string(),
            }],
            rules: vec![Rule {
                head: Atom::row("Rv0", "v1"),
                body: vec![
                    BodyItem::Atom(Atom::row("Rt2", "v")),
                    BodyItem::binding(
                        "v0",
                        DlExpr::Record {
                            type_name: "TRtmp".to_string(),
                            fields: vec![("c".to_string(), DlExpr::var("v").field("column1"))],
                        },
                    ),
                    BodyItem::binding("v1", DlExpr::var("v0")),
                ],
            }],
        }
    }

    #[test]
    fn test_render_unit() {
        let text = CodeGenerator::default().render_unit(&unit());
        assert_eq!(
            text,
            "typedef TRtmp = TRtmp{c:signed<64>}\n\
             output relation Rv0[TRtmp]\n\
             Rv0[v1] :- Rt2[v],var v0 = TRtmp{.c = v.column1},var v1 = v0.\n"
        );
    }

    #[test]
    fn test_render_prelude() {
        let text = CodeGenerator::default().render_prelude(&catalog());
        assert_eq!(
            text,
            "import sql\nimport sqlop\n\n\
             typedef TRt2 = TRt2{column1:signed<64>}\n\
             input relation Rt2[TRt2]\n"
        );
    }

    #[test]
    fn test_program_without_prelude() {
        let generator = CodeGenerator::new(EmitConfig {
            include_prelude: false,
            imports: vec![],
        });
        let units = [unit(), unit()];
        let text = generator.render_program(&catalog(), &units);
        assert!(!text.contains("input relation"));
        assert_eq!(text.matches("output relation Rv0").count(), 2);
        assert_eq!(text, generator.render_program(&catalog(), &units));
    }
}
