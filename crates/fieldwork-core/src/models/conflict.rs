//! Data conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a detected conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a conflict
///
/// `Resolved` and `Dismissed` are terminal; there are no transitions out of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
    Dismissed,
}

impl ConflictStatus {
    /// Stable string form used for storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict status: {other}"
            ))),
        }
    }
}

/// Automatic reconciliation strategy for a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Take the client snapshot wholesale
    ClientWins,
    /// Take the server snapshot wholesale
    ServerWins,
    /// The side with the later modified/updated stamp wins wholesale;
    /// falls back to `ServerWins` when neither side carries a usable stamp
    LastModifiedWins,
    /// Field-by-field merge over the union of both snapshots
    Merge,
}

/// Two divergent versions of the same resource, recorded for reconciliation
///
/// At most one open conflict exists per resource; re-detection refreshes the
/// snapshots of the existing row instead of creating a sibling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConflict {
    /// Unique identifier
    pub id: ConflictId,
    /// Identifier of the contested resource
    pub resource_id: String,
    /// Logical entity kind of the contested resource
    pub data_type: String,
    /// The locally edited snapshot that the server rejected
    pub client_version: Value,
    /// The server's current snapshot at rejection time
    pub server_version: Value,
    /// Lifecycle state
    pub status: ConflictStatus,
    /// First detection timestamp (Unix ms), stable across re-detections
    pub detected_at: i64,
    /// Resolution or dismissal timestamp (Unix ms)
    pub resolved_at: Option<i64>,
    /// The reconciled payload, recorded so a repeated resolve call can
    /// return the identical result without side effects
    pub resolved_payload: Option<Value>,
}

impl DataConflict {
    /// Create a new open conflict for the given resource
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        data_type: impl Into<String>,
        client_version: Value,
        server_version: Value,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            resource_id: resource_id.into(),
            data_type: data_type.into(),
            client_version,
            server_version,
            status: ConflictStatus::Open,
            detected_at: chrono::Utc::now().timestamp_millis(),
            resolved_at: None,
            resolved_payload: None,
        }
    }
}

/// One field of a conflict, shown side by side for manual review
///
/// `path` is a dot-notation leaf path over the union of both snapshots; a
/// side missing the field carries `None` rather than being an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictField {
    pub path: String,
    pub client: Option<Value>,
    pub server: Option<Value>,
}
