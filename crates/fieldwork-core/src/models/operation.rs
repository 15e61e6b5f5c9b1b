//! Queued mutation model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
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

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of mutation an operation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    /// Stable string form used for storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown operation type: {other}"
            ))),
        }
    }
}

/// Delivery state of a queued operation
///
/// Acknowledged operations are removed from the queue rather than kept in a
/// terminal state, so there is no `Acked` variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InFlight,
    Failed,
    Conflicted,
}

impl OperationStatus {
    /// Stable string form used for storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "failed" => Ok(Self::Failed),
            "conflicted" => Ok(Self::Conflicted),
            other => Err(Error::InvalidInput(format!(
                "unknown operation status: {other}"
            ))),
        }
    }
}

/// Delivery priority for queued operations
///
/// Priority only reorders operations across resources; within a single
/// resource, enqueue order always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// Clamp an arbitrary integer level into the supported range
    ///
    /// ```
    /// use fieldwork_core::models::Priority;
    ///
    /// assert_eq!(Priority::from_level(1), Priority::Normal);
    /// assert_eq!(Priority::from_level(9), Priority::High);
    /// assert_eq!(Priority::from_level(-3), Priority::Low);
    /// ```
    #[must_use]
    pub const fn from_level(level: i64) -> Self {
        if level <= 0 {
            Self::Low
        } else if level == 1 {
            Self::Normal
        } else {
            Self::High
        }
    }

    /// Integer level used for storage and wire formats
    #[must_use]
    pub const fn level(self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A locally captured mutation waiting to be delivered to the server
///
/// The payload snapshot is immutable once enqueued; only the delivery
/// bookkeeping fields (`status`, `attempts`, `not_before`, `last_error`)
/// change over the operation's lifetime. A reconciled payload after a
/// conflict becomes a new operation, never an edit of this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier, stable across retries
    pub id: OperationId,
    /// Mutation kind
    pub op_type: OperationType,
    /// Logical entity kind, e.g. "appraisal" or "photo_note"
    pub data_type: String,
    /// Identifier of the entity this mutation targets
    pub resource_id: String,
    /// Entity snapshot carried to the server, opaque to the queue
    pub payload: Value,
    /// Delivery priority across resources
    pub priority: Priority,
    /// Delivery state
    pub status: OperationStatus,
    /// Number of delivery attempts so far
    pub attempts: u32,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Earliest redelivery time (Unix ms), 0 when not backing off
    pub not_before: i64,
    /// Most recent delivery failure, for operator inspection
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a new pending operation with the given mutation
    #[must_use]
    pub fn new(
        op_type: OperationType,
        data_type: impl Into<String>,
        resource_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            data_type: data_type.into(),
            resource_id: resource_id.into(),
            payload,
            priority: Priority::default(),
            status: OperationStatus::Pending,
            attempts: 0,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            not_before: 0,
            last_error: None,
        }
    }

    /// Set the delivery priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
