use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Error)]
pub enum GridError {
    /// Missing grid, missing query or an adapter set up inconsistently.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid filter operator: {0}")]
    InvalidOperator(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend answered, but not with the rows the adapter expected.
    #[error("Query error: {0}")]
    Query(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
