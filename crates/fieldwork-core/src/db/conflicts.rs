//! Conflict ledger

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::db::{column_error, Database};
use crate::error::{Error, Result};
use crate::models::{ConflictId, ConflictStatus, DataConflict};
use rusqlite::params;
use serde_json::Value;
use std::sync::Arc;

/// Persistent record of detected conflicts
///
/// The `conflicts` table carries a partial unique index on `resource_id`
/// where the status is open, so a resource can never accumulate more than
/// one open conflict. Closed conflicts are kept for history until pruned.
#[derive(Clone)]
pub struct ConflictStore {
    db: Arc<Database>,
}

impl ConflictStore {
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a divergence between a client and a server snapshot
    ///
    /// If the resource already has an open conflict its snapshots are
    /// refreshed in place, keeping the original id and detection time, so
    /// repeated rejections of the same resource collapse into one entry.
    pub fn record(
        &self,
        resource_id: &str,
        data_type: &str,
        client: &Value,
        server: &Value,
    ) -> Result<DataConflict> {
        let client_json = serde_json::to_string(client)?;
        let server_json = serde_json::to_string(server)?;

        {
            let conn = self.db.connection();
            let open: Option<String> = match conn.query_row(
                "SELECT id FROM conflicts WHERE resource_id = ? AND status = 'open'",
                params![resource_id],
                |row| row.get(0),
            ) {
                Ok(id) => Some(id),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };

            if let Some(id) = open {
                conn.execute(
                    "UPDATE conflicts SET data_type = ?, client_version = ?, server_version = ?
                      WHERE id = ?",
                    params![data_type, client_json, server_json, id],
                )?;
            } else {
                let conflict = DataConflict::new(
                    resource_id,
                    data_type,
                    client.clone(),
                    server.clone(),
                );
                conn.execute(
                    "INSERT INTO conflicts
                     (id, resource_id, data_type, client_version, server_version, status, detected_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        conflict.id.as_str(),
                        conflict.resource_id,
                        conflict.data_type,
                        client_json,
                        server_json,
                        conflict.status.as_str(),
                        conflict.detected_at,
                    ],
                )?;
                drop(conn);
                tracing::info!(
                    "Recorded conflict {} for {data_type}/{resource_id}",
                    conflict.id
                );
                return Ok(conflict);
            }
        }

        tracing::debug!("Refreshed open conflict for {data_type}/{resource_id}");
        self.open_for_resource(resource_id)?
            .ok_or_else(|| Error::NotFound(format!("conflict for {resource_id}")))
    }

    /// Get a conflict by ID
    pub fn get(&self, id: &ConflictId) -> Result<Option<DataConflict>> {
        let conn = self.db.connection();
        let result = conn.query_row(
            "SELECT id, resource_id, data_type, client_version, server_version,
                    status, detected_at, resolved_at, resolved_payload
               FROM conflicts WHERE id = ?",
            params![id.as_str()],
            parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The open conflict for a resource, if any
    pub fn open_for_resource(&self, resource_id: &str) -> Result<Option<DataConflict>> {
        let conn = self.db.connection();
        let result = conn.query_row(
            "SELECT id, resource_id, data_type, client_version, server_version,
                    status, detected_at, resolved_at, resolved_payload
               FROM conflicts WHERE resource_id = ? AND status = 'open'",
            params![resource_id],
            parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List conflicts newest first, optionally filtered by status
    pub fn list(&self, status: Option<ConflictStatus>, limit: usize) -> Result<Vec<DataConflict>> {
        let conn = self.db.connection();
        let conflicts = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_id, data_type, client_version, server_version,
                            status, detected_at, resolved_at, resolved_payload
                       FROM conflicts WHERE status = ?
                      ORDER BY detected_at DESC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![status.as_str(), limit as i64], parse_conflict)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_id, data_type, client_version, server_version,
                            status, detected_at, resolved_at, resolved_payload
                       FROM conflicts ORDER BY detected_at DESC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![limit as i64], parse_conflict)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(conflicts)
    }

    /// List open conflicts, newest first
    pub fn list_open(&self, limit: usize) -> Result<Vec<DataConflict>> {
        self.list(Some(ConflictStatus::Open), limit)
    }

    /// Close an open conflict as resolved, storing the reconciled payload
    ///
    /// Returns false if the conflict was not open, in which case nothing
    /// changes; callers use that to make repeated resolution idempotent.
    pub fn mark_resolved(&self, id: &ConflictId, payload: &Value) -> Result<bool> {
        let payload_json = serde_json::to_string(payload)?;
        let now = chrono::Utc::now().timestamp_millis();
        let updated = {
            let conn = self.db.connection();
            conn.execute(
                "UPDATE conflicts
                    SET status = 'resolved', resolved_at = ?, resolved_payload = ?
                  WHERE id = ? AND status = 'open'",
                params![now, payload_json, id.as_str()],
            )?
        };
        Ok(updated > 0)
    }

    /// Close an open conflict as dismissed
    ///
    /// Returns false if the conflict was not open.
    pub fn mark_dismissed(&self, id: &ConflictId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let updated = {
            let conn = self.db.connection();
            conn.execute(
                "UPDATE conflicts SET status = 'dismissed', resolved_at = ?
                  WHERE id = ? AND status = 'open'",
                params![now, id.as_str()],
            )?
        };
        Ok(updated > 0)
    }

    /// Delete closed conflicts older than the given time, returning the count
    pub fn prune_terminal(&self, before_ms: i64) -> Result<usize> {
        let removed = {
            let conn = self.db.connection();
            conn.execute(
                "DELETE FROM conflicts
                  WHERE status != 'open' AND COALESCE(resolved_at, detected_at) < ?",
                params![before_ms],
            )?
        };
        if removed > 0 {
            tracing::debug!("Pruned {removed} closed conflicts");
        }
        Ok(removed)
    }
}

/// Parse a conflict from a database row
fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<DataConflict> {
    let id: String = row.get(0)?;
    let client_version: String = row.get(3)?;
    let server_version: String = row.get(4)?;
    let status: String = row.get(5)?;
    let resolved_payload: Option<String> = row.get(8)?;

    Ok(DataConflict {
        id: id.parse().map_err(|e| column_error(0, e))?,
        resource_id: row.get(1)?,
        data_type: row.get(2)?,
        client_version: serde_json::from_str(&client_version).map_err(|e| column_error(3, e))?,
        server_version: serde_json::from_str(&server_version).map_err(|e| column_error(4, e))?,
        status: status.parse().map_err(|e| column_error(5, e))?,
        detected_at: row.get(6)?,
        resolved_at: row.get(7)?,
        resolved_payload: resolved_payload
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| column_error(8, e))?,
    })
}
