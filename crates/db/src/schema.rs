//! Startup snapshot of the catalog.
//!
//! Built once from a single introspection query and never refreshed: a
//! schema change is only visible after a restart.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::driver::{Row, SqlDriver};
use crate::error::DriverError;

/// Tables, columns and constraint types of the `public` schema.
///
/// The constraint join fans out one row per (column, constraint) pair; the
/// builder folds that back into one column list and one label set per table.
pub const INTROSPECTION_QUERY: &str = "\
SELECT
    t.table_name::text AS table_name,
    c.column_name::text AS column_name,
    c.data_type::text AS data_type,
    c.is_nullable::text AS is_nullable,
    c.column_default::text AS column_default,
    tc.constraint_type::text AS constraint_type
FROM information_schema.tables t
LEFT JOIN information_schema.columns c
    ON c.table_schema = t.table_schema AND c.table_name = t.table_name
LEFT JOIN information_schema.table_constraints tc
    ON tc.table_schema = t.table_schema AND tc.table_name = t.table_name
WHERE t.table_schema = 'public'
ORDER BY t.table_name, c.ordinal_position";

/// A column within a cached table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// A cached table: columns in ordinal order plus the constraint types seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub constraints: BTreeSet<String>,
}

/// Immutable table-name → `TableInfo` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCache {
    tables: IndexMap<String, TableInfo>,
}

impl SchemaCache {
    /// Run the introspection query and build the cache.
    pub async fn load(driver: &dyn SqlDriver) -> Result<Self, DriverError> {
        let rows = driver.fetch_all(INTROSPECTION_QUERY).await?;
        let cache = Self::from_rows(&rows);
        info!(tables = cache.len(), "Cached schema");
        Ok(cache)
    }

    /// Fold introspection rows into a cache.
    ///
    /// Rows without a `table_name` are ignored. A repeated column name
    /// within a table (join fan-out) keeps its first occurrence.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut tables: IndexMap<String, TableInfo> = IndexMap::new();

        for row in rows {
            let Some(table_name) = text(row, "table_name") else {
                continue;
            };
            let table = tables.entry(table_name).or_default();

            if let Some(column_name) = text(row, "column_name") {
                if !table.columns.iter().any(|c| c.name == column_name) {
                    table.columns.push(ColumnInfo {
                        name: column_name,
                        data_type: text(row, "data_type").unwrap_or_default(),
                        nullable: flag(row, "is_nullable"),
                        default: text(row, "column_default"),
                    });
                }
            }

            if let Some(constraint) = text(row, "constraint_type") {
                table.constraints.insert(constraint);
            }
        }

        Self { tables }
    }

    pub fn get(&self, table_name: &str) -> Option<&TableInfo> {
        self.tables.get(table_name)
    }

    /// One table (an empty map if it is not cached) or the whole cache.
    pub fn get_schema(&self, table_name: Option<&str>) -> IndexMap<&str, &TableInfo> {
        match table_name {
            Some(name) => self
                .tables
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .into_iter()
                .collect(),
            None => self.tables.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        }
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Plain-text briefing of every table's columns, for a client that is
    /// about to write SQL against this database.
    pub fn render_context(&self) -> String {
        let mut context = String::from("Database Schema:\n");
        for (table_name, info) in &self.tables {
            let _ = write!(context, "\nTable: {table_name}\nColumns:\n");
            for col in &info.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let default = match col.default.as_deref() {
                    Some(d) if !d.is_empty() => format!(" DEFAULT {d}"),
                    _ => String::new(),
                };
                let _ = writeln!(
                    context,
                    "  - {} ({}) {}{}",
                    col.name, col.data_type, nullable, default
                );
            }
        }
        context
    }
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// `information_schema` yes/no column, or a plain boolean.
fn flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("yes"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}
