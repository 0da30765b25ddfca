//! Catalog: Schema management for base tables
//!
//! Tracks the ordered columns (name, type, nullability) of every table a view
//! may reference. Table `t` is exposed to generated programs as
//! `input relation Rt[TRt]`. The catalog is read-only while views compile and
//! may be shared between threads.

use crate::error::{CompileError, CompileResult};
use crate::ir::{RelationDecl, RelationRole, TypeDecl};
use crate::naming::{is_valid_identifier, record_type_name, relation_name, sanitize_field};
use crate::schema::{ColumnSchema, RowSchema};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Errors raised while building a catalog
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Table '{0}' is already registered")]
    DuplicateTable(String),
    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Table '{0}' has no columns")]
    EmptyTable(String),
    #[error("Invalid catalog JSON: {0}")]
    Json(String),
}

/// One base table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        TableSchema {
            name: name.into(),
            columns,
        }
    }

    /// `Rt`
    pub fn relation_name(&self) -> String {
        relation_name(&self.name)
    }

    /// `TRt`
    pub fn type_name(&self) -> String {
        record_type_name(&self.name)
    }

    /// Row schema with field-safe column names
    pub fn row_schema(&self) -> RowSchema {
        RowSchema::from_columns(
            self.columns
                .iter()
                .map(|c| ColumnSchema::new(sanitize_field(&c.name), c.data_type, c.nullable))
                .collect(),
        )
    }

    pub fn type_decl(&self) -> TypeDecl {
        self.row_schema().type_decl(&self.type_name())
    }

    pub fn relation_decl(&self) -> RelationDecl {
        RelationDecl {
            name: self.relation_name(),
            role: RelationRole::Input,
            element_type: self.type_name(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if !is_valid_identifier(&self.name) {
            return Err(CatalogError::InvalidIdentifier(self.name.clone()));
        }
        if self.columns.is_empty() {
            return Err(CatalogError::EmptyTable(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !is_valid_identifier(&column.name) {
                return Err(CatalogError::InvalidIdentifier(column.name.clone()));
            }
            if !seen.insert(sanitize_field(&column.name)) {
                return Err(CatalogError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    tables: Vec<TableSchema>,
}

/// Catalog of base tables, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
    /// Lowercased table name -> position in `tables`
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = TableSchema>) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::new();
        for table in tables {
            catalog.register_table(table)?;
        }
        Ok(catalog)
    }

    /// Parse `{"tables": [{"name": ..., "columns": [...]}]}`
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| CatalogError::Json(e.to_string()))?;
        Self::from_tables(file.tables)
    }

    /// Register a table after validating its name and columns
    pub fn register_table(&mut self, table: TableSchema) -> Result<(), CatalogError> {
        table.validate()?;
        let key = table.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(CatalogError::DuplicateTable(table.name));
        }
        self.index.insert(key, self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Look a table up by name (case-insensitive)
    pub fn lookup(&self, name: &str) -> CompileResult<&TableSchema> {
        self.get(name)
            .ok_or_else(|| CompileError::unknown_relation(name))
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.tables[i])
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tables in registration order
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    fn t1() -> TableSchema {
        TableSchema::new(
            "t1",
            vec![
                ColumnSchema::new("column1", DataType::BigInt, false),
                ColumnSchema::new("column2", DataType::Varchar, true),
            ],
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = Catalog::from_tables([t1()]).unwrap();
        assert_eq!(catalog.lookup("T1").unwrap().name, "t1");
        assert_eq!(catalog.lookup("t9").unwrap_err().kind(), "UnknownRelation");
    }

    #[test]
    fn test_duplicate_table() {
        let err = Catalog::from_tables([t1(), t1()]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateTable("t1".to_string()));
    }

    #[test]
    fn test_duplicate_column_after_sanitizing() {
        let table = TableSchema::new(
            "t",
            vec![
                ColumnSchema::new("Col", DataType::BigInt, false),
                ColumnSchema::new("col", DataType::BigInt, false),
            ],
        );
        assert!(matches!(
            Catalog::from_tables([table]),
            Err(CatalogError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_invalid_and_empty_tables() {
        let bad = TableSchema::new("my table", vec![ColumnSchema::new("a", DataType::Boolean, false)]);
        assert_eq!(
            Catalog::from_tables([bad]).unwrap_err(),
            CatalogError::InvalidIdentifier("my table".to_string())
        );
        let empty = TableSchema::new("e", vec![]);
        assert_eq!(
            Catalog::from_tables([empty]).unwrap_err(),
            CatalogError::EmptyTable("e".to_string())
        );
    }

    #[test]
    fn test_from_json() {
        let json = r#"{"tables": [
            {"name": "t2", "columns": [{"name": "column1", "data_type": "bigint"}]},
            {"name": "t4", "columns": [{"name": "column1", "data_type": "bigint", "nullable": true}]}
        ]}"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.tables()[0].name, "t2");
        assert!(catalog.lookup("t4").unwrap().columns[0].nullable);
        assert!(matches!(Catalog::from_json("{"), Err(CatalogError::Json(_))));
    }

    #[test]
    fn test_declarations() {
        let table = t1();
        assert_eq!(
            table.type_decl().to_string(),
            "typedef TRt1 = TRt1{column1:signed<64>, column2:Option<string>}"
        );
        assert_eq!(table.relation_decl().to_string(), "input relation Rt1[TRt1]");
    }
}
