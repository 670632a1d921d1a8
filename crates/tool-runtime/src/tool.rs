use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use pgbridge_db::{QueryExecutor, SchemaCache};

/// Describes a tool's interface for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "execute_sql", "get_schema")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Result of executing a tool, sent back to the client as a text block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Shared state every tool call runs against.
///
/// Built once at startup, after the pool is up and the schema is cached,
/// and handed by reference to each execution.
#[derive(Clone)]
pub struct ToolContext {
    pub executor: QueryExecutor,
    pub schema: Arc<SchemaCache>,
}

impl ToolContext {
    pub fn new(executor: QueryExecutor, schema: SchemaCache) -> Self {
        Self {
            executor,
            schema: Arc::new(schema),
        }
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The statement reached the database and failed there.
    #[error("Database error: {message}")]
    Database { message: String, sql: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

// ── Argument helpers ────────────────────────────────────────────────

/// A required, non-blank string argument.
pub fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    match input.get(key) {
        None | Some(Value::Null) => Err(ToolError::MissingParameter(key.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ToolError::MissingParameter(key.to_string()))
        }
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ToolError::InvalidInput(format!("'{key}' must be a string"))),
    }
}

/// An optional string argument; blank counts as absent.
pub fn optional_str<'a>(input: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolError::InvalidInput(format!("'{key}' must be a string"))),
    }
}

pub fn optional_bool(input: &Value, key: &str, default: bool) -> Result<bool, ToolError> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolError::InvalidInput(format!("'{key}' must be a boolean"))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use pgbridge_db::{MockDriver, Row};

    pub fn context(driver: MockDriver, schema_rows: &[Row]) -> ToolContext {
        ToolContext::new(
            QueryExecutor::new(Arc::new(driver)),
            SchemaCache::from_rows(schema_rows),
        )
    }
}
