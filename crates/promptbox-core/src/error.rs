//! Error types for promptbox-core

use thiserror::Error;

/// Result type alias using promptbox-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in promptbox-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt or tag not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A row with the same natural key already exists
    #[error("Already exists: {0}")]
    Duplicate(String),
}

impl Error {
    /// Map a libSQL error to `Duplicate` when it reports a uniqueness violation.
    pub(crate) fn from_insert(error: libsql::Error, key: &str) -> Self {
        if error.to_string().contains("UNIQUE constraint failed") {
            Self::Duplicate(key.to_string())
        } else {
            Self::LibSql(error)
        }
    }
}
