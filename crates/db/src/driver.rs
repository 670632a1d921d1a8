//! The driver seam.
//!
//! The executor and schema loader only ever talk to a `SqlDriver`, so the
//! protocol engine can be exercised without a live database.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::DriverError;

/// One result row: column name to JSON value, in result-column order.
pub type Row = IndexMap<String, Value>;

/// Executes raw SQL text against a database.
///
/// Implementations acquire one connection per call and must release it on
/// every exit path.
#[async_trait]
pub trait SqlDriver: Send + Sync {
    /// Run a statement and return every row it produced.
    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, DriverError>;

    /// Run a statement for its effect and return the command-status text
    /// (e.g. `INSERT 0 3`, `UPDATE 2`, `CREATE TABLE`).
    async fn execute(&self, sql: &str) -> Result<String, DriverError>;

    /// Release pooled resources. Called once at shutdown.
    async fn close(&self) {}
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockDriver;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone)]
    enum Scripted {
        Rows(Vec<Row>),
        Status(String),
        Fail(String),
    }

    /// Scripted in-memory driver for tests.
    ///
    /// Responses are keyed by the exact SQL text (surrounding whitespace
    /// ignored). Unscripted statements fail like an unknown relation would.
    #[derive(Default)]
    pub struct MockDriver {
        scripts: HashMap<String, Scripted>,
        latency: Option<Duration>,
        log: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        closed: AtomicBool,
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `sql` with `rows`.
        pub fn with_rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
            self.scripts.insert(key(sql), Scripted::Rows(rows));
            self
        }

        /// Answer `sql` with a command-status string.
        pub fn with_status(mut self, sql: &str, status: &str) -> Self {
            self.scripts
                .insert(key(sql), Scripted::Status(status.to_string()));
            self
        }

        /// Make `sql` fail with `message`.
        pub fn with_failure(mut self, sql: &str, message: &str) -> Self {
            self.scripts
                .insert(key(sql), Scripted::Fail(message.to_string()));
            self
        }

        /// Sleep this long inside every call, to force overlap.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Every statement received, in arrival order.
        pub fn statements(&self) -> Vec<String> {
            self.log.lock().map(|log| log.clone()).unwrap_or_default()
        }

        /// Highest number of calls observed running at the same time.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        async fn respond(&self, sql: &str) -> Result<Scripted, DriverError> {
            if let Ok(mut log) = self.log.lock() {
                log.push(sql.to_string());
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(&key(sql)).cloned() {
                Some(Scripted::Fail(message)) => Err(DriverError::Message(message)),
                Some(scripted) => Ok(scripted),
                None => Err(DriverError::Message(format!(
                    "no scripted response for statement: {}",
                    sql.trim()
                ))),
            }
        }
    }

    fn key(sql: &str) -> String {
        sql.trim().to_string()
    }

    #[async_trait]
    impl SqlDriver for MockDriver {
        async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
            match self.respond(sql).await? {
                Scripted::Rows(rows) => Ok(rows),
                Scripted::Status(_) => Ok(Vec::new()),
                Scripted::Fail(message) => Err(DriverError::Message(message)),
            }
        }

        async fn execute(&self, sql: &str) -> Result<String, DriverError> {
            match self.respond(sql).await? {
                Scripted::Status(status) => Ok(status),
                Scripted::Rows(rows) => Ok(format!("SELECT {}", rows.len())),
                Scripted::Fail(message) => Err(DriverError::Message(message)),
            }
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_mock_scripted_rows() {
        let driver = MockDriver::new().with_rows("SELECT 1 AS n", vec![row(&[("n", json!(1))])]);
        let rows = driver.fetch_all("  SELECT 1 AS n  ").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], json!(1));
        assert_eq!(driver.statements(), vec!["  SELECT 1 AS n  ".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_unscripted_fails() {
        let driver = MockDriver::new();
        let err = driver.execute("DROP TABLE nope").await.unwrap_err();
        assert!(err.driver_text().contains("DROP TABLE nope"));
    }

    #[tokio::test]
    async fn test_mock_close() {
        let driver = MockDriver::new();
        assert!(!driver.is_closed());
        driver.close().await;
        assert!(driver.is_closed());
    }
}
