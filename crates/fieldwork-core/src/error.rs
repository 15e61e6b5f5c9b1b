//! Error types for fieldwork-core

use thiserror::Error;

/// Result type alias using fieldwork-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldwork-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Conflict is already in a terminal state
    #[error("Conflict already closed: {0}")]
    ConflictClosed(String),

    /// Background sync worker failure
    #[error("Sync worker error: {0}")]
    Worker(String),
}
