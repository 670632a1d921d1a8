//! Error types for the database layer.

/// Errors raised by a [`SqlDriver`](crate::SqlDriver).
///
/// These never cross the executor boundary: `QueryExecutor` folds them
/// into `QueryResult::Failure`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Error reported by sqlx (connectivity, syntax, constraint violation).
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// A column value could not be converted to JSON.
    #[error("failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },

    /// Free-form driver failure (used by non-sqlx drivers).
    #[error("{0}")]
    Message(String),
}

impl DriverError {
    /// The error text as the database reported it.
    ///
    /// For server-side errors this is the bare message (e.g.
    /// `relation "foo" does not exist`) rather than sqlx's wrapper text.
    pub fn driver_text(&self) -> String {
        match self {
            DriverError::Sqlx(sqlx::Error::Database(db)) => db.message().to_string(),
            other => other.to_string(),
        }
    }
}
