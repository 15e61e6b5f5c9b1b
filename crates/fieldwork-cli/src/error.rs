use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldwork_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No payload provided; use --payload, --file, or pipe JSON on stdin")]
    EmptyPayload,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid ID: {0}")]
    InvalidId(String),
    #[error("Operation not found: {0}")]
    OperationNotFound(String),
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),
    #[error("Operation {0} is {1}; only pending operations can be cancelled")]
    NotCancellable(String, String),
    #[error("Pass either --strategy or a manual payload (--payload/--file)")]
    AmbiguousResolution,
    #[error(
        "Sync is not configured. Set FIELDWORK_SERVER_URL (and optionally FIELDWORK_API_KEY) to enable `fieldwork flush`."
    )]
    SyncNotConfigured,
}
