//! Conflict resolution

use crate::db::{ConflictStore, OperationQueue, RecordStore};
use crate::error::{Error, Result};
use crate::models::{
    ConflictField, ConflictId, ConflictStatus, ConflictStrategy, DataConflict, OperationType,
    Priority,
};
use crate::sync::merge::{self, MergeOverrides};
use serde_json::Value;

/// Turns an open conflict into a single reconciled payload
///
/// Every resolution path shares the same postconditions: the conflict closes
/// exactly once, the reconciled payload is re-enqueued as a fresh update so
/// it reaches the server, and the local record cache is refreshed so reads
/// agree with what was just decided. Resolving an already resolved conflict
/// returns the stored payload again and changes nothing.
#[derive(Clone)]
pub struct ConflictResolver {
    conflicts: ConflictStore,
    queue: OperationQueue,
    records: RecordStore,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(conflicts: ConflictStore, queue: OperationQueue, records: RecordStore) -> Self {
        Self {
            conflicts,
            queue,
            records,
        }
    }

    /// Resolve a conflict with an automatic strategy
    pub fn resolve(&self, id: &ConflictId, strategy: ConflictStrategy) -> Result<Value> {
        let conflict = self.load(id)?;
        let reconciled = match conflict.status {
            ConflictStatus::Open => apply_strategy(&conflict, strategy),
            ConflictStatus::Resolved => return Self::already_resolved(&conflict),
            ConflictStatus::Dismissed => return Err(Error::ConflictClosed(id.to_string())),
        };
        self.finalize(&conflict, reconciled)
    }

    /// Resolve a conflict with field-level merge and per-field overrides
    ///
    /// Overrides are keyed by dot-notation leaf path and pick which side a
    /// disputed field is taken from; unlisted disputed fields default to the
    /// server copy as in [`ConflictStrategy::Merge`].
    pub fn resolve_merge(&self, id: &ConflictId, overrides: &MergeOverrides) -> Result<Value> {
        let conflict = self.load(id)?;
        let reconciled = match conflict.status {
            ConflictStatus::Open => merge::merge(
                &conflict.client_version,
                &conflict.server_version,
                overrides,
            ),
            ConflictStatus::Resolved => return Self::already_resolved(&conflict),
            ConflictStatus::Dismissed => return Err(Error::ConflictClosed(id.to_string())),
        };
        self.finalize(&conflict, reconciled)
    }

    /// Resolve a conflict with an operator-constructed payload
    ///
    /// The payload is written through unconditionally, bypassing strategy
    /// logic, but must be a non-empty JSON object; anything else is rejected
    /// synchronously and the conflict stays open.
    pub fn resolve_manual(&self, id: &ConflictId, payload: Value) -> Result<Value> {
        validate_manual_payload(&payload)?;
        let conflict = self.load(id)?;
        match conflict.status {
            ConflictStatus::Open => self.finalize(&conflict, payload),
            ConflictStatus::Resolved => Self::already_resolved(&conflict),
            ConflictStatus::Dismissed => Err(Error::ConflictClosed(id.to_string())),
        }
    }

    /// Dismiss an open conflict without reconciling anything
    ///
    /// Dismissing a conflict that is already closed is a no-op.
    pub fn dismiss(&self, id: &ConflictId) -> Result<()> {
        let conflict = self.load(id)?;
        if self.conflicts.mark_dismissed(&conflict.id)? {
            tracing::info!(
                "Dismissed conflict {} for {}/{}",
                conflict.id,
                conflict.data_type,
                conflict.resource_id
            );
        }
        Ok(())
    }

    /// Side-by-side field view of a conflict, for manual review
    #[must_use]
    pub fn fields(conflict: &DataConflict) -> Vec<ConflictField> {
        merge::conflict_fields(&conflict.client_version, &conflict.server_version)
    }

    /// Get a conflict by ID
    pub fn get(&self, id: &ConflictId) -> Result<Option<DataConflict>> {
        self.conflicts.get(id)
    }

    /// List open conflicts, newest first
    pub fn list_open(&self, limit: usize) -> Result<Vec<DataConflict>> {
        self.conflicts.list_open(limit)
    }

    fn load(&self, id: &ConflictId) -> Result<DataConflict> {
        self.conflicts
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))
    }

    fn already_resolved(conflict: &DataConflict) -> Result<Value> {
        conflict
            .resolved_payload
            .clone()
            .ok_or_else(|| Error::ConflictClosed(conflict.id.to_string()))
    }

    /// Close the conflict and propagate the reconciled payload
    ///
    /// The close is conditional on the conflict still being open, so two
    /// racing resolutions produce one enqueued update: the loser reloads and
    /// returns whatever the winner recorded.
    fn finalize(&self, conflict: &DataConflict, reconciled: Value) -> Result<Value> {
        if !self.conflicts.mark_resolved(&conflict.id, &reconciled)? {
            let current = self.load(&conflict.id)?;
            return match current.status {
                ConflictStatus::Resolved => Self::already_resolved(&current),
                _ => Err(Error::ConflictClosed(conflict.id.to_string())),
            };
        }

        // High priority so the reconciled state outruns routine queued edits
        self.queue.enqueue(
            OperationType::Update,
            &conflict.data_type,
            &conflict.resource_id,
            reconciled.clone(),
            Priority::High,
        )?;
        self.records
            .put(&conflict.data_type, &conflict.resource_id, &reconciled)?;

        tracing::info!(
            "Resolved conflict {} for {}/{}",
            conflict.id,
            conflict.data_type,
            conflict.resource_id
        );
        Ok(reconciled)
    }
}

fn apply_strategy(conflict: &DataConflict, strategy: ConflictStrategy) -> Value {
    match strategy {
        ConflictStrategy::ClientWins => conflict.client_version.clone(),
        ConflictStrategy::ServerWins => conflict.server_version.clone(),
        ConflictStrategy::LastModifiedWins => {
            let client_ms = merge::last_modified_ms(&conflict.client_version);
            let server_ms = merge::last_modified_ms(&conflict.server_version);
            match (client_ms, server_ms) {
                (Some(client), Some(server)) if client > server => {
                    conflict.client_version.clone()
                }
                // Unstamped or older client defers to the server copy
                (Some(_), None) => conflict.client_version.clone(),
                _ => conflict.server_version.clone(),
            }
        }
        ConflictStrategy::Merge => merge::merge(
            &conflict.client_version,
            &conflict.server_version,
            &MergeOverrides::new(),
        ),
    }
}

fn validate_manual_payload(payload: &Value) -> Result<()> {
    match payload.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        Some(_) => Err(Error::InvalidInput(
            "manual resolution payload must not be empty".to_string(),
        )),
        None => Err(Error::InvalidInput(
            "manual resolution payload must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::OperationStatus;
    use crate::sync::{BackoffPolicy, ConflictDetector, MergeSide};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        queue: OperationQueue,
        conflicts: ConflictStore,
        records: RecordStore,
        detector: ConflictDetector,
        resolver: ConflictResolver,
    }

    fn setup() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        let queue = OperationQueue::new(Arc::clone(&db), backoff, 3).unwrap();
        let conflicts = ConflictStore::new(Arc::clone(&db));
        let records = RecordStore::new(Arc::clone(&db));
        let detector = ConflictDetector::new(conflicts.clone());
        let resolver =
            ConflictResolver::new(conflicts.clone(), queue.clone(), records.clone());
        Fixture {
            queue,
            conflicts,
            records,
            detector,
            resolver,
        }
    }

    fn open_conflict(fixture: &Fixture, client: Value, server: Value) -> DataConflict {
        fixture
            .detector
            .detect("p-1", "appraisal", &client, &server)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_client_wins_takes_client_verbatim() {
        let fixture = setup();
        let client = json!({"estimatedValue": 300_000, "notes": "leak under sink"});
        let conflict = open_conflict(&fixture, client.clone(), json!({"estimatedValue": 310_000}));

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::ClientWins)
            .unwrap();
        assert_eq!(reconciled, client);
    }

    #[test]
    fn test_server_wins_scenario_reenqueues_server_payload() {
        let fixture = setup();
        let server = json!({"value": 310_000, "updatedAt": "2024-02-01"});
        let conflict = open_conflict(&fixture, json!({"value": 300_000}), server.clone());

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::ServerWins)
            .unwrap();
        assert_eq!(reconciled, server);

        // The reconciled payload goes back through the queue as a new update
        let pending = fixture
            .queue
            .list(Some(OperationStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op_type, OperationType::Update);
        assert_eq!(pending[0].resource_id, "p-1");
        assert_eq!(pending[0].payload, server);
        assert_eq!(pending[0].priority, Priority::High);

        // And the local cache now reads as the reconciled state
        let cached = fixture.records.get("appraisal", "p-1").unwrap().unwrap();
        assert_eq!(cached.payload, server);
    }

    #[test]
    fn test_last_modified_wins_prefers_later_stamp() {
        let fixture = setup();
        let client = json!({"value": 1, "updatedAt": "2024-01-02"});
        let server = json!({"value": 2, "updatedAt": "2024-01-01"});
        let conflict = open_conflict(&fixture, client.clone(), server);

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::LastModifiedWins)
            .unwrap();
        assert_eq!(reconciled, client, "later-stamped side wins all fields");
    }

    #[test]
    fn test_last_modified_wins_falls_back_to_server() {
        let fixture = setup();
        let server = json!({"value": 2});
        let conflict = open_conflict(&fixture, json!({"value": 1}), server.clone());

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::LastModifiedWins)
            .unwrap();
        assert_eq!(reconciled, server, "no stamps on either side");
    }

    #[test]
    fn test_last_modified_wins_only_client_stamped() {
        let fixture = setup();
        let client = json!({"value": 1, "lastModified": "2024-01-02"});
        let conflict = open_conflict(&fixture, client.clone(), json!({"value": 2}));

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::LastModifiedWins)
            .unwrap();
        assert_eq!(reconciled, client);
    }

    #[test]
    fn test_merge_never_drops_one_sided_fields() {
        let fixture = setup();
        let client = json!({"value": 300_000, "notes": "leak under sink"});
        let server = json!({"value": 310_000});
        let conflict = open_conflict(&fixture, client, server);

        let reconciled = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::Merge)
            .unwrap();
        assert_eq!(
            reconciled,
            json!({"value": 310_000, "notes": "leak under sink"})
        );
    }

    #[test]
    fn test_resolve_merge_honors_overrides() {
        let fixture = setup();
        let conflict = open_conflict(
            &fixture,
            json!({"value": 300_000, "condition": "fair"}),
            json!({"value": 310_000, "condition": "good"}),
        );

        let mut overrides = MergeOverrides::new();
        overrides.insert("value".to_string(), MergeSide::Client);

        let reconciled = fixture
            .resolver
            .resolve_merge(&conflict.id, &overrides)
            .unwrap();
        assert_eq!(reconciled, json!({"value": 300_000, "condition": "good"}));
    }

    #[test]
    fn test_resolution_is_final() {
        let fixture = setup();
        let conflict = open_conflict(&fixture, json!({"v": 1}), json!({"v": 2}));

        let first = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::ServerWins)
            .unwrap();

        // A second resolve, even with a different strategy, changes nothing
        let second = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::ClientWins)
            .unwrap();
        assert_eq!(second, first);

        let pending = fixture
            .queue
            .list(Some(OperationStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending.len(), 1, "no duplicate operation enqueued");

        let stored = fixture.conflicts.get(&conflict.id).unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Resolved);
        assert_eq!(stored.resolved_payload, Some(first));
    }

    #[test]
    fn test_manual_resolution_writes_through() {
        let fixture = setup();
        let conflict = open_conflict(&fixture, json!({"v": 1}), json!({"v": 2}));

        let payload = json!({"v": 3, "note": "split the difference"});
        let reconciled = fixture
            .resolver
            .resolve_manual(&conflict.id, payload.clone())
            .unwrap();
        assert_eq!(reconciled, payload);

        let pending = fixture
            .queue
            .list(Some(OperationStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending[0].payload, payload);
    }

    #[test]
    fn test_manual_resolution_rejects_invalid_payloads() {
        let fixture = setup();
        let conflict = open_conflict(&fixture, json!({"v": 1}), json!({"v": 2}));

        for bad in [json!(null), json!(42), json!("text"), json!([1]), json!({})] {
            let err = fixture.resolver.resolve_manual(&conflict.id, bad).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }

        // The conflict is untouched by the rejected attempts
        let stored = fixture.conflicts.get(&conflict.id).unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Open);
        assert!(fixture
            .queue
            .list(Some(OperationStatus::Pending), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dismiss_is_terminal_and_idempotent() {
        let fixture = setup();
        let conflict = open_conflict(&fixture, json!({"v": 1}), json!({"v": 2}));

        fixture.resolver.dismiss(&conflict.id).unwrap();
        fixture.resolver.dismiss(&conflict.id).unwrap();

        let err = fixture
            .resolver
            .resolve(&conflict.id, ConflictStrategy::ServerWins)
            .unwrap_err();
        assert!(matches!(err, Error::ConflictClosed(_)));

        // Nothing was reconciled, so nothing was enqueued or cached
        assert!(fixture
            .queue
            .list(Some(OperationStatus::Pending), 10)
            .unwrap()
            .is_empty());
        assert!(fixture.records.get("appraisal", "p-1").unwrap().is_none());
    }

    #[test]
    fn test_resolve_unknown_conflict() {
        let fixture = setup();
        let err = fixture
            .resolver
            .resolve(&ConflictId::new(), ConflictStrategy::Merge)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_fields_lists_union_for_manual_review() {
        let fixture = setup();
        let conflict = open_conflict(
            &fixture,
            json!({"rooms": 7, "sketch": "s1"}),
            json!({"rooms": 8}),
        );

        let fields = ConflictResolver::fields(&conflict);
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["rooms", "sketch"]);
        assert_eq!(fields[1].client, Some(json!("s1")));
        assert_eq!(fields[1].server, None);
    }
}
