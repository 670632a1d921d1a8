//! Built-in SQL tools.
//!
//! - **Execution** (`query_database`, `execute_sql`): run client SQL through
//!   the `QueryExecutor`
//! - **Context** (`get_schema`, `natural_language_query`): answer from the
//!   startup schema snapshot without touching the database

pub mod execute_sql;
pub mod get_schema;
pub mod natural_language_query;
pub mod query_database;

pub use execute_sql::ExecuteSqlTool;
pub use get_schema::GetSchemaTool;
pub use natural_language_query::NaturalLanguageQueryTool;
pub use query_database::QueryDatabaseTool;
