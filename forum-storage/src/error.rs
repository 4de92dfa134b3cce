//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Table was not declared when the store was opened.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Column or table name outside the safe identifier alphabet.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A previous holder of the connection panicked.
    #[error("connection lock poisoned")]
    Poisoned,
}
