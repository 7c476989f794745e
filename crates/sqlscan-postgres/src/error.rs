//! Error types for the PostgreSQL catalog service.

use sqlscan_core::CatalogError;

/// Errors that can occur while talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum PgCatalogError {
    /// Database error from the driver.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The blocking runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// A catalog row did not have the expected shape.
    #[error("Unexpected catalog row: {0}")]
    UnexpectedRow(String),
}

impl From<PgCatalogError> for CatalogError {
    fn from(err: PgCatalogError) -> Self {
        match err {
            PgCatalogError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                Self::Unavailable(err.to_string())
            }
            PgCatalogError::Database(_) => Self::QueryFailed(err.to_string()),
            PgCatalogError::Runtime(_) => Self::Unavailable(err.to_string()),
            PgCatalogError::UnexpectedRow(message) => Self::UnexpectedResult(message),
        }
    }
}

/// Result type for catalog round trips.
pub type Result<T> = std::result::Result<T, PgCatalogError>;
