//! Storage layer for Fieldwork

mod connection;
mod conflicts;
mod migrations;
mod queue;
mod records;

pub use connection::Database;
pub use conflicts::ConflictStore;
pub use queue::{FailOutcome, OperationQueue, QueueCounts};
pub use records::{RecordStore, StoredRecord};

/// Wrap a per-column decode failure so it can flow through a rusqlite row
/// mapper
pub(crate) fn column_error(
    index: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(error))
}
