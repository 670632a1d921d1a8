use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{optional_str, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

/// Reads from the startup schema cache; never touches the database.
pub struct GetSchemaTool;

#[async_trait]
impl Tool for GetSchemaTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_schema".to_string(),
            description:
                "Get database schema information including tables, columns, and constraints"
                    .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "table_name": {
                        "type": "string",
                        "description": "Limit the output to this table"
                    }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let table_name = optional_str(&input, "table_name")?;
        let schema = context.schema.get_schema(table_name);
        let json = serde_json::to_string_pretty(&schema).context("failed to render schema")?;

        let text = match table_name {
            Some(name) => format!("Schema for table '{name}':\n{json}"),
            None => format!("Database Schema Information:\n{json}"),
        };
        Ok(ToolResult::text(text))
    }
}
