use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use fieldwork_core::config::EngineConfig;
use fieldwork_core::db::{ConflictStore, Database, OperationQueue, RecordStore};
use fieldwork_core::models::{ConflictId, DataConflict, Operation, OperationId};
use fieldwork_core::sync::{ConflictDetector, ConflictResolver};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

/// Everything a command needs, wired over one local database
pub struct Stores {
    pub queue: OperationQueue,
    pub conflicts: ConflictStore,
    pub records: RecordStore,
}

impl Stores {
    pub fn detector(&self) -> ConflictDetector {
        ConflictDetector::new(self.conflicts.clone())
    }

    pub fn resolver(&self) -> ConflictResolver {
        ConflictResolver::new(
            self.conflicts.clone(),
            self.queue.clone(),
            self.records.clone(),
        )
    }
}

pub fn open_stores(db_path: &Path) -> Result<Stores, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = EngineConfig::new(db_path);
    let db = Arc::new(Database::open(&config.db_path)?);
    let queue = OperationQueue::new(Arc::clone(&db), config.backoff, config.max_attempts)?;
    let conflicts = ConflictStore::new(Arc::clone(&db));
    let records = RecordStore::new(db);

    Ok(Stores {
        queue,
        conflicts,
        records,
    })
}

/// Resolve a JSON payload from an inline argument, a file, or piped stdin
pub fn read_payload(inline: Option<&str>, file: Option<&Path>) -> Result<Value, CliError> {
    if let Some(raw) = inline {
        return parse_payload(raw);
    }
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)?;
        return parse_payload(&raw);
    }
    if let Some(raw) = read_piped_stdin()? {
        return parse_payload(&raw);
    }
    Err(CliError::EmptyPayload)
}

/// Like [`read_payload`] but without falling through to stdin
pub fn read_payload_arg(inline: Option<&str>, file: Option<&Path>) -> Result<Option<Value>, CliError> {
    match (inline, file) {
        (None, None) => Ok(None),
        (inline, file) => read_payload(inline, file).map(Some),
    }
}

fn parse_payload(raw: &str) -> Result<Value, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyPayload);
    }
    serde_json::from_str(trimmed).map_err(|e| CliError::InvalidPayload(e.to_string()))
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(buffer))
    }
}

pub fn parse_operation_id(id: &str) -> Result<OperationId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

pub fn parse_conflict_id(id: &str) -> Result<ConflictId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

#[derive(Debug, Serialize)]
pub struct OperationListItem {
    pub id: String,
    pub op_type: String,
    pub data_type: String,
    pub resource_id: String,
    pub status: String,
    pub priority: i64,
    pub attempts: u32,
    pub enqueued_at: i64,
    pub relative_time: String,
    pub last_error: Option<String>,
}

pub fn operation_to_item(operation: &Operation) -> OperationListItem {
    let now_ms = Utc::now().timestamp_millis();
    OperationListItem {
        id: operation.id.to_string(),
        op_type: operation.op_type.to_string(),
        data_type: operation.data_type.clone(),
        resource_id: operation.resource_id.clone(),
        status: operation.status.to_string(),
        priority: operation.priority.level(),
        attempts: operation.attempts,
        enqueued_at: operation.enqueued_at,
        relative_time: format_relative_time(operation.enqueued_at, now_ms),
        last_error: operation.last_error.clone(),
    }
}

pub fn format_operation_lines(operations: &[Operation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    operations
        .iter()
        .map(|operation| {
            let short_id = short_id(&operation.id.to_string());
            let target = format!("{}/{}", operation.data_type, operation.resource_id);
            let relative_time = format_relative_time(operation.enqueued_at, now_ms);
            let mut line = format!(
                "{short_id:<13}  {:<6}  {target:<28}  {:<10}  {relative_time}",
                operation.op_type.to_string(),
                operation.status.to_string(),
            );
            if let Some(error) = &operation.last_error {
                line.push_str(&format!("  [{error}]"));
            }
            line
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub id: String,
    pub resource_id: String,
    pub data_type: String,
    pub status: String,
    pub detected_at: i64,
    pub relative_time: String,
}

pub fn conflict_to_item(conflict: &DataConflict) -> ConflictListItem {
    let now_ms = Utc::now().timestamp_millis();
    ConflictListItem {
        id: conflict.id.to_string(),
        resource_id: conflict.resource_id.clone(),
        data_type: conflict.data_type.clone(),
        status: conflict.status.to_string(),
        detected_at: conflict.detected_at,
        relative_time: format_relative_time(conflict.detected_at, now_ms),
    }
}

pub fn format_conflict_lines(conflicts: &[DataConflict]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    conflicts
        .iter()
        .map(|conflict| {
            let short_id = short_id(&conflict.id.to_string());
            let target = format!("{}/{}", conflict.data_type, conflict.resource_id);
            let relative_time = format_relative_time(conflict.detected_at, now_ms);
            format!(
                "{short_id:<13}  {target:<28}  {:<9}  {relative_time}",
                conflict.status.to_string()
            )
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
