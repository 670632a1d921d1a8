use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::{Row, SqlDriver};

/// Longest SQL prefix written to the logs.
const LOGGED_SQL_CHARS: usize = 100;

/// Outcome of running one statement. Driver failures are a variant, not an
/// error: nothing raised by the driver escapes `QueryExecutor::run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    /// Read statement (`SELECT` / `WITH`).
    #[serde(rename = "select")]
    Rows { rows: Vec<Row>, row_count: usize },
    /// Anything else.
    Modification { message: String, affected_rows: u64 },
    Failure {
        #[serde(rename = "error")]
        error_text: String,
        #[serde(rename = "sql")]
        offending_sql: String,
    },
}

impl QueryResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, QueryResult::Failure { .. })
    }
}

/// Read/write split decided by the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

/// Classify `sql` by its first keyword after trimming and case-folding.
///
/// `select` and `with` read; everything else writes. This is lexical only:
/// a leading comment, parenthesis, or a multi-statement script may land on
/// the write path.
pub fn classify(sql: &str) -> StatementKind {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect();
    match keyword.as_str() {
        "select" | "with" => StatementKind::Read,
        _ => StatementKind::Write,
    }
}

/// Affected-row count from a command-status string such as `INSERT 0 5`.
///
/// Zero when there is no trailing token or it is not a number.
pub fn parse_affected_rows(status: &str) -> u64 {
    let parts: Vec<&str> = status.split_whitespace().collect();
    if parts.len() < 2 {
        return 0;
    }
    parts
        .last()
        .and_then(|token| token.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Per-call switches for [`QueryExecutor::run_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// For read statements, run `EXPLAIN ANALYZE <sql>` instead and return
    /// the plan rows.
    pub explain: bool,
}

/// Runs client SQL through a driver and normalizes the outcome.
#[derive(Clone)]
pub struct QueryExecutor {
    driver: Arc<dyn SqlDriver>,
}

impl QueryExecutor {
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        Self { driver }
    }

    pub async fn run(&self, sql: &str) -> QueryResult {
        self.run_with(sql, ExecuteOptions::default()).await
    }

    pub async fn run_with(&self, sql: &str, options: ExecuteOptions) -> QueryResult {
        let kind = classify(sql);
        debug!(sql = %truncate(sql), ?kind, explain = options.explain, "Executing query");

        let outcome = match kind {
            StatementKind::Read => {
                let statement = if options.explain {
                    format!("EXPLAIN ANALYZE {}", sql.trim())
                } else {
                    sql.to_string()
                };
                self.driver.fetch_all(&statement).await.map(|rows| {
                    let row_count = rows.len();
                    debug!(row_count, "Query returned rows");
                    QueryResult::Rows { rows, row_count }
                })
            }
            StatementKind::Write => self.driver.execute(sql).await.map(|message| {
                let affected_rows = parse_affected_rows(&message);
                debug!(status = %message, affected_rows, "Statement executed");
                QueryResult::Modification {
                    message,
                    affected_rows,
                }
            }),
        };

        outcome.unwrap_or_else(|e| {
            let error_text = e.driver_text();
            warn!(error = %error_text, sql = %truncate(sql), "Query execution failed");
            QueryResult::Failure {
                error_text,
                offending_sql: sql.to_string(),
            }
        })
    }
}

fn truncate(sql: &str) -> String {
    let trimmed = sql.trim();
    if trimmed.chars().count() <= LOGGED_SQL_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(LOGGED_SQL_CHARS).collect();
    out.push_str("...");
    out
}
