//! # Row Schemas
//!
//! Column types, ordered row schemas with collision renaming, and the name
//! scopes through which SQL column references reach record fields.
//!
//! A [`RowSchema`] decides field order and field names of a generated record
//! type. A [`Scope`] maps `(qualifier, column)` pairs onto fields of one
//! row schema; several entries may point at the same field after a join
//! unifies two columns.

use crate::error::{CompileError, CompileResult};
use crate::ir::{DlType, Field, TypeDecl};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// SQL column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "bool")]
    Boolean,
    SmallInt,
    #[serde(alias = "int")]
    Integer,
    BigInt,
    #[serde(alias = "float")]
    Real,
    #[serde(alias = "float8")]
    Double,
    #[serde(alias = "text", alias = "string")]
    Varchar,
}

impl DataType {
    /// Parse a SQL type name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Some(DataType::Boolean),
            "smallint" | "int2" => Some(DataType::SmallInt),
            "integer" | "int" | "int4" => Some(DataType::Integer),
            "bigint" | "int8" => Some(DataType::BigInt),
            "real" | "float" | "float4" => Some(DataType::Real),
            "double" | "double precision" | "float8" => Some(DataType::Double),
            "varchar" | "text" | "string" => Some(DataType::Varchar),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DataType::SmallInt | DataType::Integer | DataType::BigInt)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, DataType::Real | DataType::Double)
    }

    /// Bit width of numeric types
    pub fn width(self) -> Option<u16> {
        match self {
            DataType::SmallInt => Some(16),
            DataType::Integer | DataType::Real => Some(32),
            DataType::BigInt | DataType::Double => Some(64),
            DataType::Boolean | DataType::Varchar => None,
        }
    }

    /// Non-optional target type
    pub fn dl_type(self) -> DlType {
        match self {
            DataType::Boolean => DlType::Bool,
            DataType::SmallInt => DlType::Signed(16),
            DataType::Integer => DlType::Signed(32),
            DataType::BigInt => DlType::Signed(64),
            DataType::Real => DlType::Float,
            DataType::Double => DlType::Double,
            DataType::Varchar => DlType::String,
        }
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::SmallInt => "smallint",
            DataType::Integer => "integer",
            DataType::BigInt => "bigint",
            DataType::Real => "real",
            DataType::Double => "double",
            DataType::Varchar => "varchar",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// `(name, type, nullable)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        ColumnSchema {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Field type, `Option<T>` when nullable
    pub fn dl_type(&self) -> DlType {
        let base = self.data_type.dl_type();
        if self.nullable {
            base.optional()
        } else {
            base
        }
    }

    /// Same column with nullability merged in (`a || b`)
    #[must_use]
    pub fn with_nullable(&self, nullable: bool) -> Self {
        ColumnSchema {
            nullable: self.nullable || nullable,
            ..self.clone()
        }
    }
}

/// Ordered columns of a row; names are unique
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSchema {
    columns: Vec<ColumnSchema>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from columns that are already known to be unique
    pub fn from_columns(columns: Vec<ColumnSchema>) -> Self {
        RowSchema { columns }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &ColumnSchema {
        &self.columns[index]
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Append a column, renaming it on collision.
    ///
    /// The first free name among `name`, `name0`, `name1`, ... is taken. Returns
    /// the index of the new column.
    pub fn push_unique(&mut self, column: ColumnSchema, max_suffix: u32) -> CompileResult<usize> {
        let name = if self.index_of(&column.name).is_none() {
            column.name.clone()
        } else {
            let taken: HashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
            (0..max_suffix)
                .map(|i| format!("{}{i}", column.name))
                .find(|candidate| !taken.contains(candidate.as_str()))
                .ok_or_else(|| CompileError::name_collision(column.name.clone(), max_suffix))?
        };
        self.columns.push(ColumnSchema { name, ..column });
        Ok(self.columns.len() - 1)
    }

    pub fn fields(&self) -> Vec<Field> {
        self.columns
            .iter()
            .map(|c| Field {
                name: c.name.clone(),
                ty: c.dl_type(),
            })
            .collect()
    }

    /// `typedef name = name{...}` for this row
    pub fn type_decl(&self, name: &str) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            fields: self.fields(),
        }
    }
}

// ============================================================================
// Name scopes
// ============================================================================

/// One way of naming a field from SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Table name or alias; `None` for an unaliased derived table
    pub qualifier: Option<String>,
    /// Column name as written in SQL
    pub name: String,
    /// Index into the frame's row schema
    pub field: usize,
    /// Reachable only as `qualifier.name` (right copy of a NATURAL/USING key)
    pub qualified_only: bool,
}

/// Columns visible in one FROM context
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    entries: Vec<ScopeEntry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per column, all under `qualifier`
    pub fn for_row(qualifier: Option<&str>, schema: &RowSchema) -> Self {
        let entries = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(field, column)| ScopeEntry {
                qualifier: qualifier.map(str::to_string),
                name: column.name.clone(),
                field,
                qualified_only: false,
            })
            .collect();
        Scope { entries }
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: ScopeEntry) {
        self.entries.push(entry);
    }

    pub fn has_qualifier(&self, qualifier: &str) -> bool {
        self.entries.iter().any(|e| {
            e.qualifier
                .as_deref()
                .is_some_and(|q| q.eq_ignore_ascii_case(qualifier))
        })
    }

    /// Resolve a column reference to a field index.
    ///
    /// `Ok(None)` means the reference is not visible here. More than one
    /// distinct field is an `AmbiguousColumn` error.
    pub fn resolve(&self, table: Option<&str>, name: &str) -> CompileResult<Option<usize>> {
        let mut found: Vec<usize> = Vec::new();
        for entry in &self.entries {
            if !entry.name.eq_ignore_ascii_case(name) {
                continue;
            }
            let visible = match table {
                Some(t) => entry
                    .qualifier
                    .as_deref()
                    .is_some_and(|q| q.eq_ignore_ascii_case(t)),
                None => !entry.qualified_only,
            };
            if visible && !found.contains(&entry.field) {
                found.push(entry.field);
            }
        }
        match found.as_slice() {
            [] => Ok(None),
            [field] => Ok(Some(*field)),
            _ => Err(CompileError::ambiguous_column(qualified_name(table, name))),
        }
    }

    /// Entries expanded by `*` (or `t.*` when `qualifier` is given), one per field
    pub fn star_entries(&self, qualifier: Option<&str>) -> Vec<&ScopeEntry> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| match qualifier {
                Some(q) => e
                    .qualifier
                    .as_deref()
                    .is_some_and(|eq| eq.eq_ignore_ascii_case(q)),
                None => !e.qualified_only,
            })
            .filter(|e| seen.insert(e.field))
            .collect()
    }
}

/// `t.c` or `c`
pub fn qualified_name(table: Option<&str>, name: &str) -> String {
    match table {
        Some(t) => format!("{t}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t1() -> RowSchema {
        RowSchema::from_columns(vec![
            ColumnSchema::new("column1", DataType::BigInt, false),
            ColumnSchema::new("column2", DataType::Varchar, false),
        ])
    }

    #[test]
    fn test_push_unique_appends_first_free_suffix() {
        let mut schema = t1();
        let idx = schema
            .push_unique(ColumnSchema::new("column1", DataType::BigInt, false), 100)
            .unwrap();
        assert_eq!(schema.column(idx).name, "column10");
        let idx = schema
            .push_unique(ColumnSchema::new("column1", DataType::BigInt, false), 100)
            .unwrap();
        assert_eq!(schema.column(idx).name, "column11");
    }

    #[test]
    fn test_push_unique_reports_exhaustion() {
        let mut schema = RowSchema::new();
        for name in ["c", "c0", "c1"] {
            schema
                .push_unique(ColumnSchema::new(name, DataType::Boolean, false), 2)
                .unwrap();
        }
        let err = schema
            .push_unique(ColumnSchema::new("c", DataType::Boolean, false), 2)
            .unwrap_err();
        assert_eq!(err.kind(), "NameCollisionUnresolved");
    }

    #[test]
    fn test_nullable_column_type() {
        let col = ColumnSchema::new("column1", DataType::BigInt, true);
        assert_eq!(col.dl_type().to_string(), "Option<signed<64>>");
        assert!(ColumnSchema::new("x", DataType::Real, false)
            .with_nullable(true)
            .nullable);
    }

    #[test]
    fn test_type_decl_from_schema() {
        assert_eq!(
            t1().type_decl("TRt1").to_string(),
            "typedef TRt1 = TRt1{column1:signed<64>, column2:string}"
        );
    }

    #[test]
    fn test_parse_data_type() {
        assert_eq!(DataType::parse("BIGINT"), Some(DataType::BigInt));
        assert_eq!(DataType::parse("double precision"), Some(DataType::Double));
        assert_eq!(DataType::parse("blob"), None);
    }

    #[test]
    fn test_scope_resolution() {
        let mut scope = Scope::for_row(Some("t1"), &t1());
        scope.push(ScopeEntry {
            qualifier: Some("t2".to_string()),
            name: "column1".to_string(),
            field: 0,
            qualified_only: true,
        });
        assert_eq!(scope.resolve(None, "column1").unwrap(), Some(0));
        assert_eq!(scope.resolve(Some("t2"), "column1").unwrap(), Some(0));
        assert_eq!(scope.resolve(Some("T1"), "COLUMN2").unwrap(), Some(1));
        assert_eq!(scope.resolve(None, "column9").unwrap(), None);
        assert_eq!(scope.star_entries(None).len(), 2);
    }

    #[test]
    fn test_scope_ambiguity() {
        let mut scope = Scope::for_row(Some("a"), &t1());
        scope.push(ScopeEntry {
            qualifier: Some("b".to_string()),
            name: "column1".to_string(),
            field: 2,
            qualified_only: false,
        });
        let err = scope.resolve(None, "column1").unwrap_err();
        assert_eq!(err.kind(), "AmbiguousColumn");
        assert_eq!(scope.resolve(Some("b"), "column1").unwrap(), Some(2));
    }
}
