//! Schema briefing for a natural-language question.
//!
//! The bridge does not generate SQL itself. It hands the question back with
//! enough schema context for the client's model to write the query and run
//! it through `query_database` or `execute_sql`.

use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{optional_bool, required_str, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct NaturalLanguageQueryTool;

#[async_trait]
impl Tool for NaturalLanguageQueryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "natural_language_query".to_string(),
            description: "Return the question together with a schema briefing to help write the SQL for it. Runs nothing against the database; pass the resulting SQL to query_database.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The question to answer from the database"
                    },
                    "return_sql": {
                        "type": "boolean",
                        "default": true
                    }
                },
                "required": ["question"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let question = required_str(&input, "question")?;
        // Accepted for compatibility; the brief is the same either way.
        let _return_sql = optional_bool(&input, "return_sql", true)?;

        let schema = &context.schema;
        let mut text = String::from("Natural Language Query Analysis:\n\n");
        let _ = write!(
            text,
            "Question: {question}\n\nSchema Context Available: {} tables\n\n",
            schema.len()
        );
        text.push_str(
            "To generate the appropriate SQL query, I need you to analyze the question \
             against the database schema and provide the SQL query. The schema information \
             is available via the get_schema tool if needed.\n\n",
        );
        text.push_str("Database Schema Summary:\n");
        for table in schema.table_names() {
            let _ = writeln!(text, "- {table}");
        }
        let _ = write!(text, "\n\nSchema Details:\n{}", schema.render_context());

        Ok(ToolResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::context;
    use pgbridge_db::{MockDriver, Row};
    use serde_json::json;

    fn table_row(table: &str, column: &str) -> Row {
        let mut row = Row::new();
        row.insert("table_name".into(), json!(table));
        row.insert("column_name".into(), json!(column));
        row.insert("data_type".into(), json!("text"));
        row.insert("is_nullable".into(), json!("YES"));
        row
    }

    #[tokio::test]
    async fn test_brief_lists_tables_and_context() {
        let ctx = context(
            MockDriver::new(),
            &[table_row("trips", "pickup_zone"), table_row("zones", "borough")],
        );
        let result = NaturalLanguageQueryTool
            .execute(json!({"question": "Busiest borough?"}), &ctx)
            .await
            .unwrap();

        let text = &result.content;
        assert!(text.starts_with("Natural Language Query Analysis:\n\nQuestion: Busiest borough?\n\n"));
        assert!(text.contains("Schema Context Available: 2 tables\n\n"));
        assert!(text.contains("Database Schema Summary:\n- trips\n- zones\n"));
        assert!(text.contains("\n\nSchema Details:\nDatabase Schema:\n"));
        assert!(text.contains("  - borough (text) NULL\n"));
    }

    #[tokio::test]
    async fn test_never_queries_the_database() {
        let driver = std::sync::Arc::new(MockDriver::new());
        let ctx = crate::tool::ToolContext::new(
            pgbridge_db::QueryExecutor::new(driver.clone()),
            pgbridge_db::SchemaCache::default(),
        );
        NaturalLanguageQueryTool
            .execute(json!({"question": "How many trips?", "return_sql": false}), &ctx)
            .await
            .unwrap();
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_description_does_not_promise_execution() {
        let description = NaturalLanguageQueryTool.definition().description;
        assert!(description.contains("Runs nothing"));
        assert!(!description.contains("execute it"));
    }

    #[tokio::test]
    async fn test_blank_question() {
        let ctx = context(MockDriver::new(), &[]);
        let err = NaturalLanguageQueryTool
            .execute(json!({"question": "   "}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(ref p) if p == "question"));
    }
}
