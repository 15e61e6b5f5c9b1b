//! fieldwork-core - Core library for Fieldwork
//!
//! This crate contains the shared models, the durable operation queue, and
//! the offline-first sync engine (delivery driver, conflict detection, and
//! conflict resolution) used by all Fieldwork interfaces.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use error::{Error, Result};
pub use models::{ConflictId, DataConflict, Operation, OperationId};
