//! Name and type allocation for one compilation unit.
//!
//! All generated identifiers (row variables, pattern variables, temporary
//! relations, record types, fold functions) come from a single set of used
//! names, so no two of them can clash inside a unit. Each base name is
//! numbered on its own: the first request gets the bare name, later ones the
//! first free suffix `0, 1, 2, ...`.

use crate::config::NamingConfig;
use crate::error::{CompileError, CompileResult};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Keywords of the target dialect that cannot be used as field or variable names
const RESERVED_WORDS: &[&str] = &[
    "and", "apply", "as", "break", "continue", "else", "extern", "false", "for", "function", "if",
    "import", "in", "index", "input", "match", "mut", "not", "or", "output", "relation", "return",
    "skip", "stream", "true", "type", "typedef", "var",
];

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// True if `name` is a plain SQL identifier (letters, digits, underscore)
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|re| re.is_match(name))
}

pub fn validate_identifier(name: &str) -> CompileResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(CompileError::invalid_identifier(name))
    }
}

/// Field/variable spelling of a SQL identifier: lowercase first letter,
/// reserved words get a trailing underscore
pub fn sanitize_field(name: &str) -> String {
    let mut chars = name.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    if RESERVED_WORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Relation holding the rows of table or view `name`
pub fn relation_name(name: &str) -> String {
    format!("R{name}")
}

/// Record type of table `name`
pub fn record_type_name(name: &str) -> String {
    format!("TR{name}")
}

/// Allocator of unique identifiers, scoped to one compilation unit
#[derive(Debug, Clone)]
pub struct NameAllocator {
    used: HashSet<String>,
    max_suffix: u32,
    row_prefix: String,
    temp_hint: String,
}

impl NameAllocator {
    pub fn new(config: &NamingConfig) -> Self {
        NameAllocator {
            used: HashSet::new(),
            max_suffix: config.max_suffix,
            row_prefix: config.row_variable_prefix.clone(),
            temp_hint: config.temp_hint.clone(),
        }
    }

    /// Mark `name` as taken without handing it out
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn max_suffix(&self) -> u32 {
        self.max_suffix
    }

    /// `base` if free, otherwise `base0`, `base1`, ...
    pub fn fresh(&mut self, base: &str) -> CompileResult<String> {
        if self.used.insert(base.to_string()) {
            return Ok(base.to_string());
        }
        for i in 0..self.max_suffix {
            let candidate = format!("{base}{i}");
            if self.used.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(CompileError::name_collision(base, self.max_suffix))
    }

    /// Row variable: `v`, `v0`, `v1`, ...
    pub fn fresh_variable(&mut self) -> CompileResult<String> {
        let prefix = self.row_prefix.clone();
        self.fresh(&prefix)
    }

    /// Variable bound to a destructured column
    pub fn fresh_pattern_variable(&mut self, column: &str) -> CompileResult<String> {
        self.fresh(&sanitize_field(column))
    }

    /// Temporary relation: `Rtmp`, `Rtmp0`, ... in allocation order
    pub fn fresh_temp_relation(&mut self) -> CompileResult<String> {
        let base = relation_name(&self.temp_hint);
        self.fresh(&base)
    }

    /// Record type of a merged (joined) row: `Ttmp`, `Ttmp0`, ...
    pub fn fresh_merge_type(&mut self) -> CompileResult<String> {
        let base = format!("T{}", self.temp_hint);
        self.fresh(&base)
    }

    /// Record type of a projection or aggregate: `TR<hint>` or `TRtmp`
    pub fn fresh_projection_type(&mut self, hint: Option<&str>) -> CompileResult<String> {
        let base = record_type_name(hint.unwrap_or(&self.temp_hint));
        self.fresh(&base)
    }

    pub fn fresh_function(&mut self, base: &str) -> CompileResult<String> {
        self.fresh(base)
    }
}
