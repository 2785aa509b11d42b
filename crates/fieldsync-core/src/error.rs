//! Error types for fieldsync-core

use thiserror::Error;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),
}

impl Error {
    /// Short description for sync clients; storage internals stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Sqlite(_) | Self::Io(_) => "storage error".to_string(),
            Self::Serialization(_) => "serialization error".to_string(),
            Self::Task(_) => "worker task failed".to_string(),
            Self::NotFound(_) | Self::InvalidInput(_) => self.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error.to_string())
    }
}
