//! Local record cache

use crate::db::{column_error, Database};
use crate::error::Result;
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A locally cached snapshot of a synced resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub data_type: String,
    pub resource_id: String,
    pub payload: Value,
    pub updated_at: i64,
}

/// Last-known-good snapshots of resources, keyed by kind and id
///
/// The sync driver writes here after every acknowledged mutation and the
/// resolver after every resolution, so reads reflect what the app believes
/// the server holds.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the cached snapshot for a resource
    pub fn put(&self, data_type: &str, resource_id: &str, payload: &Value) -> Result<()> {
        let payload_json = serde_json::to_string(payload)?;
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO records (data_type, resource_id, payload, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(data_type, resource_id) DO UPDATE
                SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![data_type, resource_id, payload_json, now],
        )?;
        Ok(())
    }

    /// Get the cached snapshot for a resource
    pub fn get(&self, data_type: &str, resource_id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.db.connection();
        let result = conn.query_row(
            "SELECT data_type, resource_id, payload, updated_at
               FROM records WHERE data_type = ? AND resource_id = ?",
            params![data_type, resource_id],
            |row| {
                let payload: String = row.get(2)?;
                Ok(StoredRecord {
                    data_type: row.get(0)?,
                    resource_id: row.get(1)?,
                    payload: serde_json::from_str(&payload).map_err(|e| column_error(2, e))?,
                    updated_at: row.get(3)?,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the cached snapshot for a resource
    pub fn remove(&self, data_type: &str, resource_id: &str) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "DELETE FROM records WHERE data_type = ? AND resource_id = ?",
            params![data_type, resource_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> RecordStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        RecordStore::new(db)
    }

    #[test]
    fn test_put_and_get() {
        let store = setup();
        let payload = json!({"estimatedValue": 300_000, "condition": "good"});
        store.put("appraisal", "p-1", &payload).unwrap();

        let record = store.get("appraisal", "p-1").unwrap().unwrap();
        assert_eq!(record.payload, payload);
        assert_eq!(record.data_type, "appraisal");
        assert_eq!(record.resource_id, "p-1");
        assert!(record.updated_at > 0);
    }

    #[test]
    fn test_put_replaces_existing() {
        let store = setup();
        store.put("appraisal", "p-1", &json!({"v": 1})).unwrap();
        store.put("appraisal", "p-1", &json!({"v": 2})).unwrap();

        let record = store.get("appraisal", "p-1").unwrap().unwrap();
        assert_eq!(record.payload, json!({"v": 2}));
    }

    #[test]
    fn test_keys_are_scoped_by_data_type() {
        let store = setup();
        store.put("appraisal", "p-1", &json!({"kind": "a"})).unwrap();
        store.put("photo", "p-1", &json!({"kind": "b"})).unwrap();

        let a = store.get("appraisal", "p-1").unwrap().unwrap();
        let b = store.get("photo", "p-1").unwrap().unwrap();
        assert_eq!(a.payload, json!({"kind": "a"}));
        assert_eq!(b.payload, json!({"kind": "b"}));
    }

    #[test]
    fn test_remove() {
        let store = setup();
        store.put("appraisal", "p-1", &json!({"v": 1})).unwrap();
        store.remove("appraisal", "p-1").unwrap();
        assert!(store.get("appraisal", "p-1").unwrap().is_none());

        // Removing a missing record is a no-op
        store.remove("appraisal", "p-1").unwrap();
    }
}
