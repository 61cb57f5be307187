//! Error types for the SQLite backend

use thiserror::Error;
use trellis_core::error::KnowledgeError;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<SqliteError> for KnowledgeError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::NotFound(msg) => Self::NotFound(msg),
            SqliteError::Serialization(msg) => Self::Serialization(msg),
            SqliteError::Connection(msg) | SqliteError::Query(msg) | SqliteError::Schema(msg) => {
                Self::Storage(msg)
            }
            SqliteError::Rusqlite(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for SqliteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
