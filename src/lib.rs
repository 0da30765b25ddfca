//! # sql2ddlog
//!
//! Compiles SQL view definitions into differential-Datalog (DDlog) programs.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! ViewDefinition (SQL AST) + Catalog
//!     ↓
//! [IR Builder]          → FROM tree walk, scopes, projection
//!     ├── [Join Planning]   → equi / non-equi / outer joins
//!     ├── [Decorrelation]   → derived tables as temporary relations
//!     └── [Aggregate]       → group_by + fold functions
//!     ↓
//! CompilationUnit (types, functions, relations, rules)
//!     ↓
//! [Code Generator]      → DDlog program text
//! ```
//!
//! Three-valued SQL logic over nullable columns is handled by
//! [`null_semantics`]: nullable columns become `Option<T>` fields and
//! operators over them compile to the `a_<op>_<L><R>` helpers of the `sqlop`
//! runtime library.
//!
//! ## Usage
//!
//! ```rust
//! use sql2ddlog::ast::builders::*;
//! use sql2ddlog::schema::{ColumnSchema, DataType};
//! use sql2ddlog::{compile_view_to_string, Catalog, Config, TableSchema};
//!
//! let catalog = Catalog::from_tables([TableSchema::new(
//!     "t1",
//!     vec![ColumnSchema::new("column1", DataType::BigInt, false)],
//! )])
//! .unwrap();
//! let view = QueryBuilder::new().select_all().from(table("t1")).view("v0");
//! let text = compile_view_to_string(&catalog, &Config::default(), &view).unwrap();
//! assert!(text.contains("Rv0[v0] :- Rt1[v],var v0 = v."));
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | SQL query tree and builders |
//! | `catalog` | Input tables |
//! | `schema` | Row schemas, name scopes |
//! | `naming` | Fresh names for variables, types, relations |
//! | `null_semantics` | Three-valued logic and `Option` lowering |
//! | `ir_builder` | Query walk, expressions, aggregation |
//! | `join_planning` | Join compilation |
//! | `decorrelation` | Derived tables |
//! | `ir` | Datalog IR |
//! | `code_generator` | Program text |
//! | `batch` | Many views at once |

pub mod ast;
pub mod batch;
pub mod catalog;
pub mod code_generator;
pub mod config;
pub mod decorrelation;
pub mod error;
pub mod ir;
pub mod ir_builder;
pub mod join_planning;
pub mod logging;
pub mod naming;
pub mod null_semantics;
pub mod schema;

pub use ast::{Query, ViewDefinition};
pub use batch::{compile_batch, BatchReport, ViewResult};
pub use catalog::{Catalog, CatalogError, TableSchema};
pub use code_generator::CodeGenerator;
pub use config::Config;
pub use error::{CompileError, CompileResult, SourceLocation};
pub use ir::CompilationUnit;
pub use ir_builder::QueryCompiler;

/// Compile one view into its unit
pub fn compile_view(catalog: &Catalog, config: &Config, view: &ViewDefinition) -> CompileResult<CompilationUnit> {
    QueryCompiler::new(catalog, config).compile_view(view)
}

/// Compile one view and render it, with the prelude when `emit.include_prelude` is set
pub fn compile_view_to_string(catalog: &Catalog, config: &Config, view: &ViewDefinition) -> CompileResult<String> {
    let unit = compile_view(catalog, config, view)?;
    Ok(CodeGenerator::new(config.emit.clone()).render_program(catalog, [&unit]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;
    use crate::schema::{ColumnSchema, DataType};

    #[test]
    fn test_compile_view_to_string() {
        let catalog = Catalog::from_tables([TableSchema::new(
            "t1",
            vec![ColumnSchema::new("column1", DataType::BigInt, true)],
        )])
        .unwrap();
        let view = QueryBuilder::new().select_all().from(table("t1")).view("v0");
        let text = compile_view_to_string(&catalog, &Config::default(), &view).unwrap();
        assert_eq!(
            text,
            "import sql\nimport sqlop\n\n\
             typedef TRt1 = TRt1{column1:Option<signed<64>>}\n\
             input relation Rt1[TRt1]\n\
             \n\
             output relation Rv0[TRt1]\n\
             Rv0[v0] :- Rt1[v],var v0 = v.\n"
        );
    }
}
