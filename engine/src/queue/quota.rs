//! Per-user admission quota and ownership checks.
//!
//! A quota window opens at the first admission after the previous window
//! elapsed and lasts `window_ms`. Rejected requests are not counted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::store::StoreResult;
use crate::config::QuotaConfig;
use crate::error::{QueueError, Result};
use crate::protocol::JobRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: u64,
}

/// Counter state for one user and window length.
#[derive(Debug, Clone)]
pub struct UserQuota {
    pub user_id: String,
    pub window_start: u64,
    pub count: u32,
    pub limit: u32,
}

impl UserQuota {
    pub fn new(user_id: &str, now: u64, limit: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            window_start: now,
            count: 0,
            limit,
        }
    }

    /// Reset the window if it elapsed, then admit when `count < limit`.
    pub fn check_and_increment(&mut self, now: u64, limit: u32, window_ms: u64) -> QuotaDecision {
        if now >= self.window_start.saturating_add(window_ms) {
            self.window_start = now;
            self.count = 0;
        }
        self.limit = limit;
        let reset_at = self.window_start.saturating_add(window_ms);

        if self.count < limit {
            self.count += 1;
            QuotaDecision {
                allowed: true,
                remaining: limit - self.count,
                reset_at,
            }
        } else {
            QuotaDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            }
        }
    }

    /// Return one unit to the window that ends at `reset_at`. A window that
    /// has since rolled over is left alone.
    pub fn release(&mut self, reset_at: u64, window_ms: u64) -> bool {
        if self.count == 0 || self.window_start.saturating_add(window_ms) != reset_at {
            return false;
        }
        self.count -= 1;
        true
    }
}

/// Quota counter contract. One atomic check-then-increment per call.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn check_and_increment(
        &self,
        user_id: &str,
        limit: u32,
        window_ms: u64,
        now: u64,
    ) -> StoreResult<QuotaDecision>;

    /// Undo an admission whose job was never persisted.
    async fn release(&self, user_id: &str, window_ms: u64, reset_at: u64) -> StoreResult<()>;
}

/// Admission-time quota enforcement on top of a `QuotaStore`.
#[derive(Clone)]
pub struct QuotaGuard {
    store: Arc<dyn QuotaStore>,
}

impl QuotaGuard {
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Consume one unit of the user's quota or fail with `QuotaExceeded`.
    pub async fn admit(&self, user_id: &str, quota: &QuotaConfig, now: u64) -> Result<QuotaDecision> {
        let decision = self
            .store
            .check_and_increment(user_id, quota.limit, quota.window_ms, now)
            .await?;
        if !decision.allowed {
            return Err(QueueError::QuotaExceeded {
                limit: quota.limit,
                remaining: decision.remaining,
                reset_at: decision.reset_at,
                retry_after_ms: decision.reset_at.saturating_sub(now),
            });
        }
        Ok(decision)
    }

    /// Give back the unit charged by `admit`.
    pub async fn release(&self, user_id: &str, quota: &QuotaConfig, decision: &QuotaDecision) -> Result<()> {
        self.store
            .release(user_id, quota.window_ms, decision.reset_at)
            .await?;
        Ok(())
    }
}

/// Fail with `Forbidden` unless `user_id` owns the job.
#[inline]
pub fn ensure_owner(job: &JobRecord, user_id: &str) -> Result<()> {
    if job.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(QueueError::Forbidden(job.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: u64 = 3_600_000;

    #[test]
    fn test_sixth_request_denied_until_window_elapses() {
        let mut quota = UserQuota::new("u1", 0, 5);
        for i in 0..5 {
            let d = quota.check_and_increment(i * 1000, 5, HOUR);
            assert!(d.allowed);
            assert_eq!(d.remaining, 4 - i as u32);
        }
        let denied = quota.check_and_increment(10_000, 5, HOUR);
        assert!(!denied.allowed);
        assert_eq!(denied.reset_at, HOUR);
        assert_eq!(quota.count, 5);

        let after = quota.check_and_increment(HOUR, 5, HOUR);
        assert!(after.allowed);
        assert_eq!(after.remaining, 4);
        assert_eq!(after.reset_at, 2 * HOUR);
    }

    #[test]
    fn test_window_anchors_at_first_admission_after_reset() {
        let mut quota = UserQuota::new("u1", 0, 1);
        assert!(quota.check_and_increment(0, 1, 1000).allowed);
        let d = quota.check_and_increment(5_500, 1, 1000);
        assert!(d.allowed);
        assert_eq!(d.reset_at, 6_500);
        assert!(!quota.check_and_increment(6_000, 1, 1000).allowed);
    }

    #[test]
    fn test_release_only_touches_charging_window() {
        let mut quota = UserQuota::new("u1", 0, 2);
        let first = quota.check_and_increment(0, 2, HOUR);
        quota.check_and_increment(10, 2, HOUR);
        assert!(quota.release(first.reset_at, HOUR));
        assert_eq!(quota.count, 1);

        // New window: a stale release must not free a unit in it.
        quota.check_and_increment(HOUR, 2, HOUR);
        assert!(!quota.release(first.reset_at, HOUR));
        assert_eq!(quota.count, 1);
    }
}
