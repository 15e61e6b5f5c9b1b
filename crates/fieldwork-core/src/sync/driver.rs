//! Background delivery loop

use crate::db::{FailOutcome, OperationQueue, RecordStore};
use crate::error::{Error, Result};
use crate::models::{Operation, OperationType};
use crate::sync::api::{ApiClient, ApplyOutcome};
use crate::sync::detector::ConflictDetector;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

/// Sync driver knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Concurrent in-flight deliveries across resources
    pub workers: usize,
    /// Per-attempt network timeout; elapse counts as a transient failure
    pub request_timeout: Duration,
    /// How long an idle loop sleeps before polling the queue again
    pub idle_poll: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            request_timeout: Duration::from_secs(30),
            idle_poll: Duration::from_secs(15),
        }
    }
}

impl DriverConfig {
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }
}

/// Tally of one draining pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    /// Operations the server acknowledged
    pub delivered: usize,
    /// Delivery attempts that were put back for retry
    pub retried: usize,
    /// Operations parked as failed
    pub failed: usize,
    /// Operations parked behind a newly recorded conflict
    pub conflicted: usize,
}

impl DriverStats {
    fn absorb(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Retried => self.retried += 1,
            Delivery::Failed => self.failed += 1,
            Delivery::Conflicted => self.conflicted += 1,
        }
    }
}

/// How one dequeued operation ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Retried,
    Failed,
    Conflicted,
}

/// Pumps the operation queue against the server whenever connectivity allows
///
/// One loop dequeues; each dequeued operation is delivered on its own task
/// behind a semaphore, so unrelated resources sync in parallel up to the
/// worker bound while the queue's frontier rule keeps each single resource
/// strictly in enqueue order. Capture-path callers never wait on this: their
/// writes go to the queue and the driver picks them up on its own time.
pub struct SyncDriver {
    inner: Arc<DriverInner>,
    config: DriverConfig,
    online: AtomicBool,
    wake: Notify,
}

/// The collaborators a delivery task needs, cloned into each spawn
struct DriverInner {
    queue: OperationQueue,
    detector: ConflictDetector,
    records: RecordStore,
    api: Arc<dyn ApiClient>,
    request_timeout: Duration,
}

impl SyncDriver {
    #[must_use]
    pub fn new(
        queue: OperationQueue,
        detector: ConflictDetector,
        records: RecordStore,
        api: Arc<dyn ApiClient>,
        config: DriverConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                queue,
                detector,
                records,
                api,
                request_timeout: config.request_timeout,
            }),
            config,
            online: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    /// Whether the driver currently believes the server is reachable
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record a connectivity transition, waking the loop when it comes back
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::AcqRel);
        if online && !was {
            tracing::info!("Connectivity regained, resuming sync");
            self.wake.notify_one();
        } else if !online && was {
            tracing::info!("Connectivity lost, pausing sync");
        }
    }

    /// Nudge a sleeping loop to check the queue now
    pub fn flush(&self) {
        self.wake.notify_one();
    }

    /// Deliver everything currently eligible and report the tally
    ///
    /// Runs until the queue has nothing ready and no delivery is in flight.
    /// Operations whose backoff window has not opened yet are left pending;
    /// going offline mid-pass stops new dequeues but lets in-flight
    /// deliveries finish.
    pub async fn run_until_idle(&self) -> Result<DriverStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<Result<Delivery>> = JoinSet::new();
        let mut stats = DriverStats::default();

        loop {
            while let Some(joined) = tasks.try_join_next() {
                stats.absorb(joined.map_err(|e| Error::Worker(e.to_string()))??);
            }

            let ready = if self.is_online() {
                let now = chrono::Utc::now().timestamp_millis();
                self.inner.queue.dequeue_ready(now)?
            } else {
                None
            };

            match ready {
                Some(operation) => {
                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Worker(e.to_string()))?;
                    let inner = Arc::clone(&self.inner);
                    tasks.spawn(async move {
                        let delivery = inner.deliver(&operation).await;
                        drop(permit);
                        delivery
                    });
                }
                None => match tasks.join_next().await {
                    Some(joined) => {
                        stats.absorb(joined.map_err(|e| Error::Worker(e.to_string()))??);
                    }
                    None => break,
                },
            }
        }

        Ok(stats)
    }

    /// Long-lived background loop
    ///
    /// Alternates draining passes with sleeps bounded by the next backoff
    /// window and the idle poll interval; `flush` and `set_online` cut the
    /// sleep short. Offline, it parks until connectivity returns.
    pub async fn run(&self) -> Result<()> {
        loop {
            if !self.is_online() {
                self.wake.notified().await;
                continue;
            }

            let stats = self.run_until_idle().await?;
            if stats != DriverStats::default() {
                tracing::debug!(
                    "Sync pass: {} delivered, {} retried, {} failed, {} conflicted",
                    stats.delivered,
                    stats.retried,
                    stats.failed,
                    stats.conflicted
                );
            }

            let now = chrono::Utc::now().timestamp_millis();
            let sleep = match self.inner.queue.next_ready_at(now)? {
                Some(at) => {
                    let until = u64::try_from(at.saturating_sub(now)).unwrap_or(0);
                    Duration::from_millis(until).min(self.config.idle_poll)
                }
                None => self.config.idle_poll,
            };

            tokio::select! {
                () = self.wake.notified() => {}
                () = tokio::time::sleep(sleep) => {}
            }
        }
    }
}

impl DriverInner {
    /// Deliver one dequeued operation and settle its queue state
    async fn deliver(&self, operation: &Operation) -> Result<Delivery> {
        let outcome =
            match tokio::time::timeout(self.request_timeout, self.api.apply(operation)).await {
                Ok(outcome) => outcome,
                Err(_) => ApplyOutcome::Transient {
                    reason: format!(
                        "no response within {}ms",
                        self.request_timeout.as_millis()
                    ),
                },
            };

        let now = chrono::Utc::now().timestamp_millis();
        match outcome {
            ApplyOutcome::Acked => {
                self.queue.ack(&operation.id)?;
                self.refresh_cache(operation)?;
                tracing::debug!(
                    "Delivered {} for {}/{}",
                    operation.op_type,
                    operation.data_type,
                    operation.resource_id
                );
                Ok(Delivery::Delivered)
            }
            ApplyOutcome::Transient { reason } => {
                match self.queue.fail(&operation.id, &reason, true, now)? {
                    FailOutcome::Retry { .. } => Ok(Delivery::Retried),
                    FailOutcome::Abandoned => Ok(Delivery::Failed),
                }
            }
            ApplyOutcome::Permanent { reason } => {
                self.queue.fail(&operation.id, &reason, false, now)?;
                Ok(Delivery::Failed)
            }
            ApplyOutcome::VersionConflict { server_version } => {
                let detected = self.detector.detect(
                    &operation.resource_id,
                    &operation.data_type,
                    &operation.payload,
                    &server_version,
                )?;
                match detected {
                    Some(conflict) => {
                        self.queue
                            .mark_conflicted(&operation.id, "server version diverged")?;
                        tracing::warn!(
                            "Conflict {} opened for {}/{}",
                            conflict.id,
                            operation.data_type,
                            operation.resource_id
                        );
                        Ok(Delivery::Conflicted)
                    }
                    None => {
                        // The server already holds exactly this state, so the
                        // write has effectively landed
                        self.queue.ack(&operation.id)?;
                        self.refresh_cache(operation)?;
                        Ok(Delivery::Delivered)
                    }
                }
            }
        }
    }

    fn refresh_cache(&self, operation: &Operation) -> Result<()> {
        match operation.op_type {
            OperationType::Create | OperationType::Update => self.records.put(
                &operation.data_type,
                &operation.resource_id,
                &operation.payload,
            ),
            OperationType::Delete => self
                .records
                .remove(&operation.data_type, &operation.resource_id),
        }
    }
}
