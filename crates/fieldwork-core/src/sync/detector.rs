//! Conflict detection

use crate::db::ConflictStore;
use crate::error::Result;
use crate::models::DataConflict;
use serde_json::Value;

/// Decides whether two snapshots of a resource actually diverge
///
/// Comparison is structural: object key order is irrelevant, array order and
/// value types are not. Snapshots that agree are not conflicts at all, which
/// is how a rejected write whose content the server already holds gets
/// acknowledged instead of surfaced to the user.
#[derive(Clone)]
pub struct ConflictDetector {
    conflicts: ConflictStore,
}

impl ConflictDetector {
    #[must_use]
    pub fn new(conflicts: ConflictStore) -> Self {
        Self { conflicts }
    }

    /// Compare snapshots, recording a conflict when they differ
    ///
    /// Returns `None` when the versions agree. When they differ, the
    /// resource's open conflict is created or refreshed and returned.
    pub fn detect(
        &self,
        resource_id: &str,
        data_type: &str,
        client_version: &Value,
        server_version: &Value,
    ) -> Result<Option<DataConflict>> {
        if client_version == server_version {
            return Ok(None);
        }
        let conflict =
            self.conflicts
                .record(resource_id, data_type, client_version, server_version)?;
        Ok(Some(conflict))
    }
}
