//! Human-readable SQL execution with an optional query plan.

use std::fmt::Write as _;

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use pgbridge_db::{ExecuteOptions, QueryResult, Row};

use crate::tool::{optional_bool, required_str, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

/// Result sets larger than this are summarized.
const FULL_RESULT_LIMIT: usize = 100;
/// Rows shown when a result set is summarized.
const PREVIEW_ROWS: usize = 10;

pub struct ExecuteSqlTool;

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "execute_sql".to_string(),
            description: "Execute SQL and return a readable summary, optionally with the EXPLAIN ANALYZE plan of a read query".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The SQL statement to execute"
                    },
                    "explain_plan": {
                        "type": "boolean",
                        "description": "Return the execution plan of a SELECT instead of its rows",
                        "default": false
                    }
                },
                "required": ["sql"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let sql = required_str(&input, "sql")?;
        let explain = optional_bool(&input, "explain_plan", false)?;
        debug!(sql_len = sql.len(), explain, "execute_sql");

        let result = context
            .executor
            .run_with(sql, ExecuteOptions { explain })
            .await;

        let text = match result {
            QueryResult::Rows { rows, row_count } => render_rows(&rows, row_count)?,
            QueryResult::Modification {
                message,
                affected_rows,
            } => format!("Query executed successfully.\n{message}\nAffected rows: {affected_rows}"),
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

fn render_rows(rows: &[Row], row_count: usize) -> Result<String, ToolError> {
    let mut text = format!("Query executed successfully.\nReturned {row_count} rows.\n\n");

    if rows.is_empty() {
        text.push_str("No rows returned.");
    } else if rows.len() <= FULL_RESULT_LIMIT {
        let json = serde_json::to_string_pretty(rows).context("failed to render result rows")?;
        let _ = write!(text, "Results:\n{json}");
    } else {
        let preview = serde_json::to_string_pretty(&rows[..PREVIEW_ROWS])
            .context("failed to render result preview")?;
        let _ = write!(
            text,
            "Large result set ({} rows). Showing first {PREVIEW_ROWS}:\n{preview}\n... and {} more rows",
            rows.len(),
            rows.len() - PREVIEW_ROWS
        );
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::context;
    use pgbridge_db::MockDriver;
    use serde_json::json;

    fn numbered_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".to_string(), json!(i));
                row
            })
            .collect()
    }

    #[tokio::test]
    async fn test_small_result_set() {
        let ctx = context(
            MockDriver::new().with_rows("SELECT n FROM series", numbered_rows(3)),
            &[],
        );
        let result = ExecuteSqlTool
            .execute(json!({"sql": "SELECT n FROM series"}), &ctx)
            .await
            .unwrap();
        assert!(result
            .content
            .starts_with("Query executed successfully.\nReturned 3 rows.\n\nResults:\n"));
        let json_part = result.content.split_once("Results:\n").unwrap().1;
        let parsed: Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_large_result_set_is_summarized() {
        let ctx = context(
            MockDriver::new().with_rows("SELECT n FROM big", numbered_rows(150)),
            &[],
        );
        let result = ExecuteSqlTool
            .execute(json!({"sql": "SELECT n FROM big"}), &ctx)
            .await
            .unwrap();
        assert!(result.content.contains("Returned 150 rows."));
        assert!(result
            .content
            .contains("Large result set (150 rows). Showing first 10:\n"));
        assert!(result.content.ends_with("\n... and 140 more rows"));
        assert!(result.content.contains("\"n\": 9"));
        assert!(!result.content.contains("\"n\": 10"));
    }

    #[tokio::test]
    async fn test_exactly_one_hundred_rows_shown_in_full() {
        let ctx = context(
            MockDriver::new().with_rows("SELECT n FROM hundred", numbered_rows(100)),
            &[],
        );
        let result = ExecuteSqlTool
            .execute(json!({"sql": "SELECT n FROM hundred"}), &ctx)
            .await
            .unwrap();
        assert!(result.content.contains("Results:\n"));
        assert!(result.content.contains("\"n\": 99"));
    }

    #[tokio::test]
    async fn test_empty_result() {
        let ctx = context(MockDriver::new().with_rows("SELECT 1 WHERE false", vec![]), &[]);
        let result = ExecuteSqlTool
            .execute(json!({"sql": "SELECT 1 WHERE false"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            result.content,
            "Query executed successfully.\nReturned 0 rows.\n\nNo rows returned."
        );
    }

    #[tokio::test]
    async fn test_write_summary() {
        let sql = "DELETE FROM trips WHERE fare < 0";
        let ctx = context(MockDriver::new().with_status(sql, "DELETE 4"), &[]);
        let result = ExecuteSqlTool.execute(json!({"sql": sql}), &ctx).await.unwrap();
        assert_eq!(
            result.content,
            "Query executed successfully.\nDELETE 4\nAffected rows: 4"
        );
    }

    #[tokio::test]
    async fn test_explain_plan() {
        let mut plan = Row::new();
        plan.insert("QUERY PLAN".to_string(), json!("Seq Scan on trips"));
        let ctx = context(
            MockDriver::new().with_rows("EXPLAIN ANALYZE SELECT * FROM trips", vec![plan]),
            &[],
        );
        let result = ExecuteSqlTool
            .execute(
                json!({"sql": "SELECT * FROM trips", "explain_plan": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.content.contains("Seq Scan on trips"));
    }

    #[tokio::test]
    async fn test_explain_plan_must_be_boolean() {
        let ctx = context(MockDriver::new(), &[]);
        let err = ExecuteSqlTool
            .execute(json!({"sql": "SELECT 1", "explain_plan": "yes"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_failure_surfaces_as_database_error() {
        let ctx = context(
            MockDriver::new().with_failure("DROP TABLE nope", "table \"nope\" does not exist"),
            &[],
        );
        let err = ExecuteSqlTool
            .execute(json!({"sql": "DROP TABLE nope"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Database error: table \"nope\" does not exist");
    }
}
