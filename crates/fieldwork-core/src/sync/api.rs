//! Server transport seam

use crate::models::Operation;
use async_trait::async_trait;
use serde_json::Value;

/// Result of handing one operation to the server
///
/// Transports map every failure mode onto one of these instead of returning
/// errors, so the driver can treat each delivery as a plain queue transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The server accepted the mutation
    Acked,
    /// The server rejected the write because its copy has diverged;
    /// carries the server's current snapshot for conflict detection
    VersionConflict { server_version: Value },
    /// Delivery failed in a way worth retrying (network, 5xx, throttling)
    Transient { reason: String },
    /// Delivery failed in a way retrying cannot fix (validation, auth)
    Permanent { reason: String },
}

/// Transport used by the sync driver to deliver operations
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Apply one operation to the server
    async fn apply(&self, operation: &Operation) -> ApplyOutcome;
}
