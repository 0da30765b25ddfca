//! Compiler Error Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a construct in the original query text (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

fn located(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" (at {loc})"),
        None => String::new(),
    }
}

/// Errors raised while compiling a single view
///
/// Every variant names the offending construct so a diagnostic can be printed
/// without re-walking the query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Table (or derived table alias) not found
    #[error("unknown relation '{name}'{}", located(.location))]
    UnknownRelation {
        name: String,
        location: Option<SourceLocation>,
    },

    /// Column reference does not resolve in the current scope
    #[error("unknown column '{column}'{}", located(.location))]
    UnknownColumn {
        column: String,
        location: Option<SourceLocation>,
    },

    /// Unqualified column reference matches more than one input column
    #[error("ambiguous column '{column}'{}", located(.location))]
    AmbiguousColumn {
        column: String,
        location: Option<SourceLocation>,
    },

    /// Incompatible operand types
    #[error("type mismatch in '{construct}': {left} vs {right}{}", located(.location))]
    TypeMismatch {
        construct: String,
        left: String,
        right: String,
        location: Option<SourceLocation>,
    },

    /// A plain operator was applied to a nullable operand
    #[error("nullable operand in '{construct}' requires a null-aware operator{}", located(.location))]
    NullabilityMismatch {
        construct: String,
        location: Option<SourceLocation>,
    },

    /// Relational feature outside the supported set
    #[error("unsupported construct '{construct}': {reason}{}", located(.location))]
    UnsupportedConstruct {
        construct: String,
        reason: String,
        location: Option<SourceLocation>,
    },

    /// Select item is neither a group key nor an aggregate
    #[error("column '{column}' must appear in GROUP BY or inside an aggregate{}", located(.location))]
    UngroupedColumn {
        column: String,
        location: Option<SourceLocation>,
    },

    /// Name cannot be expressed as a Datalog identifier
    #[error("invalid identifier '{name}'{}", located(.location))]
    InvalidIdentifier {
        name: String,
        location: Option<SourceLocation>,
    },

    /// Suffix space exhausted while making a name unique
    #[error("could not find a free name for '{base}' after {attempts} attempts{}", located(.location))]
    NameCollisionUnresolved {
        base: String,
        attempts: u32,
        location: Option<SourceLocation>,
    },
}

impl CompileError {
    pub fn unknown_relation(name: impl Into<String>) -> Self {
        CompileError::UnknownRelation {
            name: name.into(),
            location: None,
        }
    }

    pub fn unknown_column(column: impl Into<String>) -> Self {
        CompileError::UnknownColumn {
            column: column.into(),
            location: None,
        }
    }

    pub fn ambiguous_column(column: impl Into<String>) -> Self {
        CompileError::AmbiguousColumn {
            column: column.into(),
            location: None,
        }
    }

    pub fn type_mismatch(
        construct: impl Into<String>,
        left: impl fmt::Display,
        right: impl fmt::Display,
    ) -> Self {
        CompileError::TypeMismatch {
            construct: construct.into(),
            left: left.to_string(),
            right: right.to_string(),
            location: None,
        }
    }

    pub fn nullability_mismatch(construct: impl Into<String>) -> Self {
        CompileError::NullabilityMismatch {
            construct: construct.into(),
            location: None,
        }
    }

    pub fn unsupported(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct {
            construct: construct.into(),
            reason: reason.into(),
            location: None,
        }
    }

    pub fn ungrouped_column(column: impl Into<String>) -> Self {
        CompileError::UngroupedColumn {
            column: column.into(),
            location: None,
        }
    }

    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        CompileError::InvalidIdentifier {
            name: name.into(),
            location: None,
        }
    }

    pub fn name_collision(base: impl Into<String>, attempts: u32) -> Self {
        CompileError::NameCollisionUnresolved {
            base: base.into(),
            attempts,
            location: None,
        }
    }

    /// Source location carried by this error, if any
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            CompileError::UnknownRelation { location, .. }
            | CompileError::UnknownColumn { location, .. }
            | CompileError::AmbiguousColumn { location, .. }
            | CompileError::TypeMismatch { location, .. }
            | CompileError::NullabilityMismatch { location, .. }
            | CompileError::UnsupportedConstruct { location, .. }
            | CompileError::UngroupedColumn { location, .. }
            | CompileError::InvalidIdentifier { location, .. }
            | CompileError::NameCollisionUnresolved { location, .. } => *location,
        }
    }

    /// Attach `loc` unless a more precise location is already present
    #[must_use]
    pub fn with_location(mut self, loc: Option<SourceLocation>) -> Self {
        let slot = match &mut self {
            CompileError::UnknownRelation { location, .. }
            | CompileError::UnknownColumn { location, .. }
            | CompileError::AmbiguousColumn { location, .. }
            | CompileError::TypeMismatch { location, .. }
            | CompileError::NullabilityMismatch { location, .. }
            | CompileError::UnsupportedConstruct { location, .. }
            | CompileError::UngroupedColumn { location, .. }
            | CompileError::InvalidIdentifier { location, .. }
            | CompileError::NameCollisionUnresolved { location, .. } => location,
        };
        if slot.is_none() {
            *slot = loc;
        }
        self
    }

    /// Short machine-readable kind, used in batch diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::UnknownRelation { .. } => "UnknownRelation",
            CompileError::UnknownColumn { .. } => "UnknownColumn",
            CompileError::AmbiguousColumn { .. } => "AmbiguousColumn",
            CompileError::TypeMismatch { .. } => "TypeMismatch",
            CompileError::NullabilityMismatch { .. } => "NullabilityMismatch",
            CompileError::UnsupportedConstruct { .. } => "UnsupportedConstruct",
            CompileError::UngroupedColumn { .. } => "UngroupedColumn",
            CompileError::InvalidIdentifier { .. } => "InvalidIdentifier",
            CompileError::NameCollisionUnresolved { .. } => "NameCollisionUnresolved",
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_without_location() {
        let err = CompileError::unknown_relation("t9");
        assert_eq!(err.to_string(), "unknown relation 't9'");
    }

    #[test]
    fn test_error_display_with_location() {
        let err = CompileError::unknown_column("x.c").with_location(Some(SourceLocation::new(3, 7)));
        assert_eq!(err.to_string(), "unknown column 'x.c' (at line 3, column 7)");
    }

    #[test]
    fn test_with_location_keeps_inner_location() {
        let inner = Some(SourceLocation::new(2, 1));
        let outer = Some(SourceLocation::new(1, 1));
        let err = CompileError::unsupported("FULL JOIN", "not supported")
            .with_location(inner)
            .with_location(outer);
        assert_eq!(err.location(), inner);
    }

    #[test]
    fn test_name_collision_display_with_location() {
        let err = CompileError::name_collision("Ttmp", 3).with_location(Some(SourceLocation::new(1, 1)));
        assert_eq!(err.location(), Some(SourceLocation::new(1, 1)));
        assert_eq!(
            err.to_string(),
            "could not find a free name for 'Ttmp' after 3 attempts (at line 1, column 1)"
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CompileError::ungrouped_column("c").kind(), "UngroupedColumn");
        assert_eq!(
            CompileError::type_mismatch("a = b", "bigint", "varchar").kind(),
            "TypeMismatch"
        );
    }
}
