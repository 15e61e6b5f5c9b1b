//! Durable operation queue

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::db::{column_error, Database};
use crate::error::{Error, Result};
use crate::models::{Operation, OperationId, OperationStatus, OperationType, Priority};
use crate::sync::BackoffPolicy;
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Disposition of a failed delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Redelivery scheduled once the backoff window passes
    Retry { not_before: i64 },
    /// The record moved to failed and will not be retried
    Abandoned,
}

/// Queue depth by status
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub conflicted: usize,
}

impl QueueCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.in_flight + self.failed + self.conflicted
    }
}

/// Durable store of operations awaiting delivery
///
/// Enqueued mutations are committed to `SQLite` before `enqueue` returns, so
/// they survive restarts. Dequeue hands out at most one operation per
/// resource at a time, oldest first, which is what guarantees per-resource
/// delivery order; priority only reorders the fronts of different resources'
/// queues.
#[derive(Clone)]
pub struct OperationQueue {
    db: Arc<Database>,
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl OperationQueue {
    /// Create a queue over the given database
    ///
    /// Any operation left in flight by an interrupted process reverts to
    /// pending here, so a crash between send and acknowledgement re-delivers
    /// rather than drops (at-least-once).
    pub fn new(db: Arc<Database>, backoff: BackoffPolicy, max_attempts: u32) -> Result<Self> {
        let queue = Self {
            db,
            backoff,
            max_attempts: max_attempts.max(1),
        };
        let recovered = {
            let conn = queue.db.connection();
            conn.execute(
                "UPDATE operations SET status = 'pending' WHERE status = 'in_flight'",
                [],
            )?
        };
        if recovered > 0 {
            tracing::info!("Recovered {recovered} interrupted deliveries back to pending");
        }
        Ok(queue)
    }

    /// Persist a new mutation and return the queued record
    ///
    /// Pure local write; never touches the network.
    pub fn enqueue(
        &self,
        op_type: OperationType,
        data_type: &str,
        resource_id: &str,
        payload: Value,
        priority: Priority,
    ) -> Result<Operation> {
        let operation =
            Operation::new(op_type, data_type, resource_id, payload).with_priority(priority);
        let payload_json = serde_json::to_string(&operation.payload)?;

        {
            let conn = self.db.connection();
            conn.execute(
                "INSERT INTO operations
                 (id, op_type, data_type, resource_id, payload, priority, status, attempts, enqueued_at, not_before)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    operation.id.as_str(),
                    operation.op_type.as_str(),
                    operation.data_type,
                    operation.resource_id,
                    payload_json,
                    operation.priority.level(),
                    operation.status.as_str(),
                    operation.attempts,
                    operation.enqueued_at,
                    operation.not_before,
                ],
            )?;
        }

        tracing::debug!(
            "Enqueued {} for {}/{} as {}",
            operation.op_type,
            operation.data_type,
            operation.resource_id,
            operation.id
        );
        Ok(operation)
    }

    /// Take the next deliverable operation, marking it in flight
    ///
    /// Eligible rows are each resource's oldest pending operation, provided
    /// the resource has nothing in flight and the row's backoff window has
    /// passed. Among those fronts the highest priority wins, then the oldest.
    /// A resource whose front is still backing off yields nothing: younger
    /// siblings must wait their turn.
    pub fn dequeue_ready(&self, now_ms: i64) -> Result<Option<Operation>> {
        let conn = self.db.connection();
        let candidate = conn.query_row(
            "SELECT o.id, o.op_type, o.data_type, o.resource_id, o.payload, o.priority,
                    o.status, o.attempts, o.enqueued_at, o.not_before, o.last_error
               FROM operations o
              WHERE o.status = 'pending'
                AND o.not_before <= ?1
                AND NOT EXISTS (
                    SELECT 1 FROM operations f
                     WHERE f.resource_id = o.resource_id AND f.status = 'in_flight')
                AND o.seq = (
                    SELECT MIN(p.seq) FROM operations p
                     WHERE p.resource_id = o.resource_id AND p.status = 'pending')
              ORDER BY o.priority DESC, o.seq ASC
              LIMIT 1",
            params![now_ms],
            parse_operation,
        );

        let mut operation = match candidate {
            Ok(operation) => operation,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        conn.execute(
            "UPDATE operations SET status = 'in_flight' WHERE id = ?",
            params![operation.id.as_str()],
        )?;
        operation.status = OperationStatus::InFlight;
        Ok(Some(operation))
    }

    /// Acknowledge an operation, removing it from the queue
    ///
    /// Idempotent: acknowledging an unknown or already-removed id is a
    /// no-op. Acknowledging a pending record withdraws it before delivery.
    pub fn ack(&self, id: &OperationId) -> Result<()> {
        let removed = {
            let conn = self.db.connection();
            conn.execute("DELETE FROM operations WHERE id = ?", params![id.as_str()])?
        };
        if removed > 0 {
            tracing::debug!("Acknowledged operation {id}");
        }
        Ok(())
    }

    /// Record a failed delivery attempt
    ///
    /// Retryable failures go back to pending with an exponential backoff
    /// window until attempts are exhausted; everything else is parked as
    /// failed with the reason kept for operator inspection.
    pub fn fail(
        &self,
        id: &OperationId,
        reason: &str,
        retryable: bool,
        now_ms: i64,
    ) -> Result<FailOutcome> {
        let conn = self.db.connection();
        let attempts: u32 = match conn.query_row(
            "SELECT attempts FROM operations WHERE id = ?",
            params![id.as_str()],
            |row| row.get(0),
        ) {
            Ok(attempts) => attempts,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(Error::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let attempts = attempts + 1;

        if retryable && attempts < self.max_attempts {
            let delay = self.backoff.delay(attempts);
            let not_before =
                now_ms.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
            conn.execute(
                "UPDATE operations
                    SET status = 'pending', attempts = ?, not_before = ?, last_error = ?
                  WHERE id = ?",
                params![attempts, not_before, reason, id.as_str()],
            )?;
            drop(conn);
            tracing::debug!("Attempt {attempts} failed for operation {id}, backing off: {reason}");
            Ok(FailOutcome::Retry { not_before })
        } else {
            conn.execute(
                "UPDATE operations SET status = 'failed', attempts = ?, last_error = ? WHERE id = ?",
                params![attempts, reason, id.as_str()],
            )?;
            drop(conn);
            tracing::warn!("Giving up on operation {id} after {attempts} attempt(s): {reason}");
            Ok(FailOutcome::Abandoned)
        }
    }

    /// Park an operation whose write the server rejected on version mismatch
    ///
    /// The record is superseded by whatever conflict resolution re-enqueues,
    /// so it is never retried as-is.
    pub fn mark_conflicted(&self, id: &OperationId, note: &str) -> Result<()> {
        let updated = {
            let conn = self.db.connection();
            conn.execute(
                "UPDATE operations SET status = 'conflicted', last_error = ? WHERE id = ?",
                params![note, id.as_str()],
            )?
        };
        if updated == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        tracing::warn!("Operation {id} rejected by the server: {note}");
        Ok(())
    }

    /// Get an operation by ID
    pub fn get(&self, id: &OperationId) -> Result<Option<Operation>> {
        let conn = self.db.connection();
        let result = conn.query_row(
            "SELECT id, op_type, data_type, resource_id, payload, priority,
                    status, attempts, enqueued_at, not_before, last_error
               FROM operations WHERE id = ?",
            params![id.as_str()],
            parse_operation,
        );

        match result {
            Ok(operation) => Ok(Some(operation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List operations in enqueue order, optionally filtered by status
    pub fn list(&self, status: Option<OperationStatus>, limit: usize) -> Result<Vec<Operation>> {
        let conn = self.db.connection();
        let operations = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, op_type, data_type, resource_id, payload, priority,
                            status, attempts, enqueued_at, not_before, last_error
                       FROM operations WHERE status = ? ORDER BY seq ASC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![status.as_str(), limit as i64], parse_operation)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, op_type, data_type, resource_id, payload, priority,
                            status, attempts, enqueued_at, not_before, last_error
                       FROM operations ORDER BY seq ASC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![limit as i64], parse_operation)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(operations)
    }

    /// List operations parked as failed, for operator attention
    pub fn list_failed(&self, limit: usize) -> Result<Vec<Operation>> {
        self.list(Some(OperationStatus::Failed), limit)
    }

    /// Queue depth by status
    pub fn counts(&self) -> Result<QueueCounts> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM operations GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => counts.pending = count,
                "in_flight" => counts.in_flight = count,
                "failed" => counts.failed = count,
                "conflicted" => counts.conflicted = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Re-arm a failed operation for delivery, resetting its attempts
    pub fn requeue_failed(&self, id: &OperationId) -> Result<Operation> {
        let updated = {
            let conn = self.db.connection();
            conn.execute(
                "UPDATE operations
                    SET status = 'pending', attempts = 0, not_before = 0, last_error = NULL
                  WHERE id = ? AND status = 'failed'",
                params![id.as_str()],
            )?
        };

        if updated == 0 {
            return match self.get(id)? {
                Some(operation) => Err(Error::InvalidInput(format!(
                    "operation {id} is {}, only failed operations can be requeued",
                    operation.status
                ))),
                None => Err(Error::NotFound(id.to_string())),
            };
        }

        tracing::info!("Requeued failed operation {id}");
        self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Earliest future redelivery time among pending operations
    ///
    /// Lets the driver sleep exactly until the next backoff window opens.
    pub fn next_ready_at(&self, now_ms: i64) -> Result<Option<i64>> {
        let conn = self.db.connection();
        let next: Option<i64> = conn.query_row(
            "SELECT MIN(not_before) FROM operations WHERE status = 'pending' AND not_before > ?",
            params![now_ms],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}

/// Parse an operation from a database row
fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Operation> {
    let id: String = row.get(0)?;
    let op_type: String = row.get(1)?;
    let payload: String = row.get(4)?;
    let status: String = row.get(6)?;

    Ok(Operation {
        id: id.parse().map_err(|e| column_error(0, e))?,
        op_type: op_type.parse().map_err(|e| column_error(1, e))?,
        data_type: row.get(2)?,
        resource_id: row.get(3)?,
        payload: serde_json::from_str(&payload).map_err(|e| column_error(4, e))?,
        priority: Priority::from_level(row.get(5)?),
        status: status.parse().map_err(|e| column_error(6, e))?,
        attempts: row.get(7)?,
        enqueued_at: row.get(8)?,
        not_before: row.get(9)?,
        last_error: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<Database>, OperationQueue) {
        setup_with_max_attempts(3)
    }

    fn setup_with_max_attempts(max_attempts: u32) -> (Arc<Database>, OperationQueue) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        let queue = OperationQueue::new(Arc::clone(&db), backoff, max_attempts).unwrap();
        (db, queue)
    }

    fn enqueue_update(queue: &OperationQueue, resource_id: &str, payload: Value) -> Operation {
        queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                resource_id,
                payload,
                Priority::Normal,
            )
            .unwrap()
    }

    #[test]
    fn test_enqueue_and_get() {
        let (_db, queue) = setup();
        let payload = json!({"estimatedValue": 300_000, "address": {"street": "12 Elm"}});

        let op = enqueue_update(&queue, "p-1", payload.clone());
        assert_eq!(op.status, OperationStatus::Pending);

        let fetched = queue.get(&op.id).unwrap().unwrap();
        assert_eq!(fetched.id, op.id);
        assert_eq!(fetched.payload, payload);
        assert_eq!(fetched.status, OperationStatus::Pending);
        assert_eq!(fetched.attempts, 0);
    }

    #[test]
    fn test_dequeue_marks_in_flight() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        let taken = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(taken.id, op.id);
        assert_eq!(taken.status, OperationStatus::InFlight);

        let stored = queue.get(&op.id).unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::InFlight);
    }

    #[test]
    fn test_dequeue_empty_queue() {
        let (_db, queue) = setup();
        let now = chrono::Utc::now().timestamp_millis();
        assert!(queue.dequeue_ready(now).unwrap().is_none());
    }

    #[test]
    fn test_same_resource_is_fifo_even_against_priority() {
        let (_db, queue) = setup();
        let first = queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                "p-1",
                json!({"v": 1}),
                Priority::Low,
            )
            .unwrap();
        queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                "p-1",
                json!({"v": 2}),
                Priority::High,
            )
            .unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        let taken = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(taken.id, first.id, "enqueue order wins within a resource");
    }

    #[test]
    fn test_priority_orders_across_resources() {
        let (_db, queue) = setup();
        queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                "p-1",
                json!({"v": 1}),
                Priority::Normal,
            )
            .unwrap();
        let urgent = queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                "p-2",
                json!({"v": 2}),
                Priority::High,
            )
            .unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        let taken = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(taken.id, urgent.id);
    }

    #[test]
    fn test_in_flight_blocks_resource_but_not_others() {
        let (_db, queue) = setup();
        let a = enqueue_update(&queue, "p-1", json!({"v": 1}));
        let b = enqueue_update(&queue, "p-1", json!({"v": 2}));
        let c = enqueue_update(&queue, "p-2", json!({"v": 3}));

        let now = chrono::Utc::now().timestamp_millis();
        let first = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(first.id, a.id);

        // p-1 has an in-flight delivery, so only p-2 is eligible
        let second = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(second.id, c.id);
        assert!(queue.dequeue_ready(now).unwrap().is_none());

        queue.ack(&a.id).unwrap();
        let third = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(third.id, b.id);
    }

    #[test]
    fn test_ack_is_idempotent() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        queue.ack(&op.id).unwrap();
        queue.ack(&op.id).unwrap();
        queue.ack(&OperationId::new()).unwrap();

        assert_eq!(queue.counts().unwrap().total(), 0);
    }

    #[test]
    fn test_ack_withdraws_pending_operation() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        queue.ack(&op.id).unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        assert!(queue.dequeue_ready(now).unwrap().is_none());
        assert!(queue.get(&op.id).unwrap().is_none());
    }

    #[test]
    fn test_fail_schedules_backoff() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        let outcome = queue.fail(&op.id, "connection reset", true, now).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retry {
                not_before: now + 100
            }
        );

        // Not eligible until the window passes
        assert!(queue.dequeue_ready(now).unwrap().is_none());
        assert!(queue.dequeue_ready(now + 99).unwrap().is_none());

        let retried = queue.dequeue_ready(now + 100).unwrap().unwrap();
        assert_eq!(retried.id, op.id);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_backoff_frontier_blocks_younger_sibling() {
        let (_db, queue) = setup();
        let first = enqueue_update(&queue, "p-1", json!({"v": 1}));
        queue
            .enqueue(
                OperationType::Update,
                "appraisal",
                "p-1",
                json!({"v": 2}),
                Priority::High,
            )
            .unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        let taken = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(taken.id, first.id);
        queue.fail(&first.id, "connection reset", true, now).unwrap();

        // The resource's front is backing off, so its younger sibling must
        // wait out the window too, higher priority notwithstanding
        assert!(queue.dequeue_ready(now + 50).unwrap().is_none());

        let retried = queue.dequeue_ready(now + 100).unwrap().unwrap();
        assert_eq!(retried.id, first.id, "the front retries before the sibling");
    }

    #[test]
    fn test_fail_backoff_doubles() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        queue.fail(&op.id, "timeout", true, now).unwrap();

        let second_now = now + 100;
        queue.dequeue_ready(second_now).unwrap().unwrap();
        let outcome = queue.fail(&op.id, "timeout", true, second_now).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retry {
                not_before: second_now + 200
            }
        );
    }

    #[test]
    fn test_fail_exhausts_to_failed() {
        let (_db, queue) = setup_with_max_attempts(3);
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let mut now = chrono::Utc::now().timestamp_millis();
        for attempt in 1..3 {
            let taken = queue.dequeue_ready(now).unwrap().unwrap();
            assert_eq!(taken.id, op.id);
            match queue.fail(&op.id, "still down", true, now).unwrap() {
                FailOutcome::Retry { not_before } => now = not_before,
                FailOutcome::Abandoned => panic!("abandoned too early at attempt {attempt}"),
            }
        }

        queue.dequeue_ready(now).unwrap().unwrap();
        let outcome = queue.fail(&op.id, "still down", true, now).unwrap();
        assert_eq!(outcome, FailOutcome::Abandoned);

        let stored = queue.get(&op.id).unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert!(queue.dequeue_ready(now + 60_000).unwrap().is_none());
    }

    #[test]
    fn test_permanent_failure_abandons_immediately() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        let outcome = queue.fail(&op.id, "422 unprocessable", false, now).unwrap();
        assert_eq!(outcome, FailOutcome::Abandoned);

        let stored = queue.get(&op.id).unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[test]
    fn test_conflicted_operation_unblocks_resource() {
        let (_db, queue) = setup();
        let a = enqueue_update(&queue, "p-1", json!({"v": 1}));
        let b = enqueue_update(&queue, "p-1", json!({"v": 2}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        queue.mark_conflicted(&a.id, "version conflict").unwrap();

        let stored = queue.get(&a.id).unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Conflicted);

        let next = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[test]
    fn test_restart_recovers_in_flight_to_pending() {
        let (db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        assert!(queue.dequeue_ready(now).unwrap().is_none());

        // Simulated restart: a fresh queue over the same database
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        let restarted = OperationQueue::new(db, backoff, 3).unwrap();

        let redelivered = restarted.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(redelivered.id, op.id);
    }

    #[test]
    fn test_restart_recovers_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        let now = chrono::Utc::now().timestamp_millis();

        let op = {
            let db = Arc::new(Database::open(&path).unwrap());
            let queue = OperationQueue::new(db, backoff, 3).unwrap();
            let op = enqueue_update(&queue, "p-1", json!({"v": 1}));
            queue.dequeue_ready(now).unwrap().unwrap();
            op
        };

        let db = Arc::new(Database::open(&path).unwrap());
        let queue = OperationQueue::new(db, backoff, 3).unwrap();
        let recovered = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(recovered.id, op.id);
        assert_eq!(recovered.payload, json!({"v": 1}));
    }

    #[test]
    fn test_requeue_failed() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        queue.fail(&op.id, "410 gone", false, now).unwrap();

        let requeued = queue.requeue_failed(&op.id).unwrap();
        assert_eq!(requeued.status, OperationStatus::Pending);
        assert_eq!(requeued.attempts, 0);
        assert!(requeued.last_error.is_none());

        assert!(queue.dequeue_ready(now).unwrap().is_some());
    }

    #[test]
    fn test_requeue_rejects_non_failed_operations() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));

        let err = queue.requeue_failed(&op.id).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = queue.requeue_failed(&OperationId::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_counts_by_status() {
        let (_db, queue) = setup();
        enqueue_update(&queue, "p-1", json!({"v": 1}));
        let b = enqueue_update(&queue, "p-2", json!({"v": 2}));
        let c = enqueue_update(&queue, "p-3", json!({"v": 3}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();

        let taken = queue.dequeue_ready(now).unwrap().unwrap();
        assert_eq!(taken.id, b.id);
        queue.fail(&b.id, "451 legal", false, now).unwrap();

        queue.dequeue_ready(now).unwrap().unwrap();
        queue.mark_conflicted(&c.id, "version conflict").unwrap();

        let counts = queue.counts().unwrap();
        assert_eq!(counts.in_flight, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.conflicted, 1);
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_list_filters_by_status() {
        let (_db, queue) = setup();
        let a = enqueue_update(&queue, "p-1", json!({"v": 1}));
        enqueue_update(&queue, "p-2", json!({"v": 2}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();

        let pending = queue.list(Some(OperationStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 1);

        let in_flight = queue.list(Some(OperationStatus::InFlight), 10).unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].id, a.id);

        let all = queue.list(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id, "listing follows enqueue order");
    }

    #[test]
    fn test_list_failed() {
        let (_db, queue) = setup();
        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));
        enqueue_update(&queue, "p-2", json!({"v": 2}));

        let now = chrono::Utc::now().timestamp_millis();
        queue.dequeue_ready(now).unwrap().unwrap();
        queue.fail(&op.id, "410 gone", false, now).unwrap();

        let failed = queue.list_failed(10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, op.id);
    }

    #[test]
    fn test_next_ready_at() {
        let (_db, queue) = setup();
        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(queue.next_ready_at(now).unwrap(), None);

        let op = enqueue_update(&queue, "p-1", json!({"v": 1}));
        assert_eq!(queue.next_ready_at(now).unwrap(), None);

        queue.dequeue_ready(now).unwrap().unwrap();
        queue.fail(&op.id, "timeout", true, now).unwrap();
        assert_eq!(queue.next_ready_at(now).unwrap(), Some(now + 100));
    }
}
