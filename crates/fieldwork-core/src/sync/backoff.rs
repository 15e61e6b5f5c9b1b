//! Retry backoff policy

use std::time::Duration;

/// Exponential backoff with a hard cap
///
/// Deliberately deterministic (no jitter): redelivery eligibility times feed
/// the queue's `not_before` column and the driver's sleep arithmetic, and
/// both are easier to reason about without randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Create a policy that starts at `base` and doubles up to `cap`
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the given attempt is retried
    ///
    /// `attempt` is the number of deliveries already tried, so the first
    /// retry (attempt 1) waits the base delay. Attempt 0 is treated as 1.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(self.cap.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(1_u64 << exponent).min(cap_ms);
        Duration::from_millis(delay_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(60))
    }
}
