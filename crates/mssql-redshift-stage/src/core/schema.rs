//! Schema metadata types for source tables.
//!
//! These types are read-only snapshots built once per table migration and
//! consumed by the cloner and extractor. Column order is significant and
//! preserved end-to-end: extraction and load rely on positional
//! correspondence with the created target table.

use serde::{Deserialize, Serialize};

/// Column metadata as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared data type (e.g. "int", "nvarchar", "datetime2").
    pub data_type: String,

    /// Maximum character length for character types, if declared.
    pub char_length: Option<i32>,

    /// Numeric precision for exact-numeric types, if declared.
    pub precision: Option<i32>,

    /// Numeric scale for exact-numeric types, if declared.
    pub scale: Option<i32>,

    /// Ordinal position (1-based).
    pub ordinal: i32,
}

/// Ordered column list for one table, in physical column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// An empty schema signals "source table not found".
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Declared type names in schema order.
    pub fn column_types(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }
}

/// A source table reference, optionally schema-qualified.
///
/// Accepts `schema.table` and MSSQL `[bracketed]` names; an unqualified name
/// resolves against the configured default schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub schema: String,
    pub name: String,
}

impl SourceTable {
    /// Parse a table reference, falling back to `default_schema` when the
    /// name is unqualified.
    pub fn parse(raw: &str, default_schema: &str) -> Self {
        let (schema, name) = match raw.split_once('.') {
            Some((s, n)) => (s.to_string(), n.to_string()),
            None => (default_schema.to_string(), raw.to_string()),
        };

        Self {
            schema: strip_brackets(&schema),
            name: strip_brackets(&name),
        }
    }

    /// The qualified `schema.name` form.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

fn strip_brackets(part: &str) -> String {
    part.trim_start_matches('[').trim_end_matches(']').to_string()
}

/// One requested field: a source column name plus an optional output rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChoice {
    pub source: String,
    pub rename: Option<String>,
}

impl FieldChoice {
    /// Parse `name` or `name:rename`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((source, rename)) => Self {
                source: source.to_string(),
                rename: Some(rename.to_string()),
            },
            None => Self {
                source: raw.to_string(),
                rename: None,
            },
        }
    }
}

/// An optional projection of the source schema.
///
/// Matching is case-insensitive against source column names. Schema order is
/// preserved regardless of the order the choices were given in; a choice that
/// carries a rename replaces the output column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    pub choices: Vec<FieldChoice>,
}

impl FieldSelection {
    pub fn new(choices: Vec<FieldChoice>) -> Self {
        Self { choices }
    }

    /// Parse a list of `name` / `name:rename` entries.
    pub fn parse(entries: &[String]) -> Self {
        Self::new(entries.iter().map(|e| FieldChoice::parse(e)).collect())
    }

    fn find(&self, source_name: &str) -> Option<&FieldChoice> {
        self.choices
            .iter()
            .find(|c| c.source.eq_ignore_ascii_case(source_name))
    }

    /// Project a schema onto this selection, applying renames.
    pub fn apply(&self, schema: &TableSchema) -> TableSchema {
        let columns = schema
            .columns
            .iter()
            .filter_map(|col| {
                self.find(&col.name).map(|choice| {
                    let mut out = col.clone();
                    if let Some(rename) = &choice.rename {
                        out.name = rename.clone();
                    }
                    out
                })
            })
            .collect();
        TableSchema::new(columns)
    }

    /// The surviving *source* column names in schema order, for building the
    /// read query (renames apply to the target only).
    pub fn select_list(&self, schema: &TableSchema) -> Vec<String> {
        schema
            .columns
            .iter()
            .filter(|col| self.find(&col.name).is_some())
            .map(|col| col.name.clone())
            .collect()
    }
}
