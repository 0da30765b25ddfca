//! Batch compilation.
//!
//! Every view of a batch is compiled into its own unit; a failing view yields
//! an error entry and leaves the others untouched. Results keep input order
//! whether the batch runs sequentially or on a rayon pool.

use crate::ast::ViewDefinition;
use crate::catalog::Catalog;
use crate::code_generator::CodeGenerator;
use crate::config::Config;
use crate::error::CompileResult;
use crate::ir::CompilationUnit;
use crate::ir_builder::QueryCompiler;
use rayon::prelude::*;
use tracing::{info, warn};

/// Outcome of one view
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResult {
    pub view: String,
    pub result: CompileResult<CompilationUnit>,
}

impl ViewResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Compile `views` independently against `catalog`
pub fn compile_batch(catalog: &Catalog, config: &Config, views: &[ViewDefinition]) -> Vec<ViewResult> {
    let compiler = QueryCompiler::new(catalog, config);
    let compile_one = |view: &ViewDefinition| {
        let result = compiler.compile_view(view);
        if let Err(e) = &result {
            warn!(view = %view.name, kind = e.kind(), "view failed: {}", e);
        }
        ViewResult {
            view: view.name.clone(),
            result,
        }
    };

    if !config.batch.parallel {
        return views.iter().map(compile_one).collect();
    }

    if config.batch.num_threads == 0 {
        return views.par_iter().map(compile_one).collect();
    }

    match rayon::ThreadPoolBuilder::new()
        .num_threads(config.batch.num_threads)
        .build()
    {
        Ok(pool) => pool.install(|| views.par_iter().map(compile_one).collect()),
        Err(e) => {
            warn!(error = %e, "could not build batch thread pool, compiling sequentially");
            views.iter().map(compile_one).collect()
        }
    }
}

/// Summary of a compiled batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub results: Vec<ViewResult>,
}

impl BatchReport {
    pub fn compile(catalog: &Catalog, config: &Config, views: &[ViewDefinition]) -> Self {
        let report = BatchReport {
            results: compile_batch(catalog, config, views),
        };
        info!(
            views = report.results.len(),
            failed = report.failed(),
            "batch compiled"
        );
        report
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn units(&self) -> impl Iterator<Item = &CompilationUnit> {
        self.results.iter().filter_map(|r| r.result.as_ref().ok())
    }

    /// Program text of the successful views
    pub fn render(&self, catalog: &Catalog, config: &Config) -> String {
        CodeGenerator::new(config.emit.clone()).render_program(catalog, self.units())
    }

    /// One line per failed view
    pub fn diagnostics(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| format!("{}: {}", r.view, e)))
            .collect()
    }
}
