//! Error types for the event store and query service.

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted timestamp could not be parsed back.
    #[error("store timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Errors returned by the [`QueryService`](crate::QueryService).
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The caller-supplied filter was malformed. Returned to the caller;
    /// no system-side effect.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Failed to obtain a database connection.
    #[error("query connection error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The underlying store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
