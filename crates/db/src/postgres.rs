//! PostgreSQL driver backed by a sqlx connection pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Number, Value};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column, Row as _, TypeInfo};
use tracing::{info, warn};

use pgbridge_core::PostgresConfig;

use crate::driver::{Row, SqlDriver};
use crate::error::DriverError;

/// `SqlDriver` over a bounded `PgPool`.
///
/// Statements go through the simple-query protocol (`sqlx::raw_sql`) so
/// arbitrary client SQL, including DDL and multi-statement scripts, runs as
/// written. Writes run in autocommit mode: each statement is committed by
/// the server as soon as it completes.
pub struct PgDriver {
    pool: PgPool,
}

impl PgDriver {
    /// Create the pool and open the first connection.
    ///
    /// Fails if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DriverError> {
        let ssl_mode = config.ssl_mode.parse::<PgSslMode>().unwrap_or_else(|e| {
            warn!(ssl_mode = %config.ssl_mode, error = %e, "Unknown SSL mode, using 'prefer'");
            PgSslMode::Prefer
        });

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(
            target_db = %config.connection_label(),
            max_connections = config.max_connections,
            "PostgreSQL pool created"
        );
        Ok(Self { pool })
    }

}

#[async_trait]
impl SqlDriver for PgDriver {
    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        // The pool checks out one connection for the call and takes it back
        // on every exit path, errors included.
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn execute(&self, sql: &str) -> Result<String, DriverError> {
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(command_tag(sql, result.rows_affected()))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Rebuild the server's command-status text from the statement verb and
/// the affected-row count sqlx reports.
///
/// Leading comments are skipped. A non-zero count is never dropped: verbs
/// whose tag normally carries no count get it appended.
pub fn command_tag(sql: &str, rows_affected: u64) -> String {
    let mut words = strip_leading_comments(sql)
        .split(|c: char| c.is_whitespace() || c == ';' || c == '(')
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase);
    let verb = words.next().unwrap_or_default();

    let tag = match verb.as_str() {
        "INSERT" => return format!("INSERT 0 {rows_affected}"),
        "UPDATE" | "DELETE" | "MERGE" | "COPY" | "MOVE" | "FETCH" | "SELECT" => {
            return format!("{verb} {rows_affected}")
        }
        "CREATE" | "DROP" | "ALTER" => {
            let rest: Vec<String> = words.collect();
            // CREATE TABLE .. AS and CREATE MATERIALIZED VIEW report rows like a SELECT.
            if verb == "CREATE" && rest.iter().any(|w| w == "AS") && rows_affected > 0 {
                return format!("SELECT {rows_affected}");
            }
            match object_kind(&rest) {
                Some(object) => format!("{verb} {object}"),
                None => verb.clone(),
            }
        }
        _ => verb.clone(),
    };

    if rows_affected > 0 {
        format!("{tag} {rows_affected}")
    } else {
        tag
    }
}

/// Object keyword of a DDL statement, skipping modifiers such as
/// `OR REPLACE`, `TEMP` and `UNIQUE`.
fn object_kind(words: &[String]) -> Option<&str> {
    const MODIFIERS: &[&str] = &[
        "OR", "REPLACE", "TEMP", "TEMPORARY", "UNLOGGED", "UNIQUE", "GLOBAL", "LOCAL",
    ];
    words
        .iter()
        .map(String::as_str)
        .find(|w| !MODIFIERS.contains(w))
}

/// Drop leading whitespace, `--` line comments and (nested) `/* */` block
/// comments.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(end) => after[end + 1..].trim_start(),
                None => "",
            };
        } else if rest.starts_with("/*") {
            let mut depth = 0usize;
            let mut end = None;
            let bytes = rest.as_bytes();
            let mut i = 0;
            while i + 1 < bytes.len() {
                match (bytes[i], bytes[i + 1]) {
                    (b'/', b'*') => {
                        depth += 1;
                        i += 2;
                    }
                    (b'*', b'/') => {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => i += 1,
                }
            }
            rest = match end {
                Some(end) => rest[end..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Convert a result row into an ordered JSON mapping.
pub(crate) fn row_to_json(row: &PgRow) -> Result<Row, DriverError> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name()).map_err(|source| {
            DriverError::Decode {
                column: column.name().to_string(),
                source,
            }
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(idx)?
            .map(|oid| Value::from(oid.0)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| float_value(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(float_value),
        "NUMERIC" => raw_text(row, idx)?.map(|text| numeric_value(&text)),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string())),
        _ => raw_text(row, idx)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// The server's text rendering of a value of any type.
fn raw_text(row: &PgRow, idx: usize) -> Result<Option<String>, sqlx::Error> {
    row.try_get_unchecked::<Option<String>, _>(idx)
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

/// `NUMERIC` as a JSON number when it fits, otherwise its exact text.
fn numeric_value(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => float_value(f),
        _ => Value::String(text.to_string()),
    }
}
