//! Data models for Fieldwork

mod conflict;
mod operation;

pub use conflict::{ConflictField, ConflictId, ConflictStatus, ConflictStrategy, DataConflict};
pub use operation::{Operation, OperationId, OperationStatus, OperationType, Priority};
