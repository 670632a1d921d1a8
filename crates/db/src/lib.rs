//! Database side of the bridge.
//!
//! - **driver**: the `SqlDriver` seam the rest of the bridge executes against
//! - **postgres**: the sqlx-backed driver and row normalization
//! - **executor**: statement classification and `QueryResult` outcomes
//! - **schema**: the startup catalog snapshot

pub mod driver;
pub mod error;
pub mod executor;
pub mod postgres;
pub mod schema;

pub use driver::{Row, SqlDriver};
#[cfg(any(test, feature = "test-utils"))]
pub use driver::MockDriver;
pub use error::DriverError;
pub use executor::{classify, parse_affected_rows, ExecuteOptions, QueryExecutor, QueryResult, StatementKind};
pub use postgres::PgDriver;
pub use schema::{ColumnInfo, SchemaCache, TableInfo};
