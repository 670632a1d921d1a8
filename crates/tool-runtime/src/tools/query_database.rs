//! Structured SQL execution: results come back as JSON.

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use pgbridge_db::QueryResult;

use crate::tool::{required_str, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

/// Execute one statement and return rows (reads) or a status object (writes)
/// as pretty-printed JSON.
pub struct QueryDatabaseTool;

#[derive(Serialize)]
struct WriteStatus {
    status: String,
    affected_rows: u64,
}

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "query_database".to_string(),
            description: "Execute a SQL query on the PostgreSQL database and return results"
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The SQL query to execute"
                    }
                },
                "required": ["sql"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let sql = required_str(&input, "sql")?;
        debug!(sql_len = sql.len(), "query_database");

        // Rows are rendered straight from their ordered maps so result-column
        // order survives.
        let text = match context.executor.run(sql).await {
            QueryResult::Rows { rows, .. } => {
                serde_json::to_string_pretty(&rows).context("failed to render result rows")?
            }
            QueryResult::Modification {
                message,
                affected_rows,
            } => serde_json::to_string_pretty(&WriteStatus {
                status: message,
                affected_rows,
            })
            .context("failed to render write status")?,
            QueryResult::Failure {
                error_text,
                offending_sql,
            } => {
                return Err(ToolError::Database {
                    message: error_text,
                    sql: offending_sql,
                })
            }
        };

        Ok(ToolResult::text(text))
    }
}
