//! Global metrics with atomic counters.
//!
//! Monotonic counters updated on every lifecycle transition. Per-state gauges
//! come from the store (see `get_queue_stats`), not from here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub struct GlobalMetrics {
    pub total_enqueued: AtomicU64,
    pub total_claimed: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_retried: AtomicU64,
    pub total_stalled: AtomicU64,
    pub total_cancelled: AtomicU64,
    pub total_removed: AtomicU64,
    pub quota_rejections: AtomicU64,
    pub latency_sum: AtomicU64,
    pub latency_count: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_enqueued: u64,
    pub total_claimed: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_stalled: u64,
    pub total_cancelled: u64,
    pub total_removed: u64,
    pub quota_rejections: u64,
    pub avg_latency_ms: f64,
}

impl GlobalMetrics {
    pub fn new() -> Self {
        Self {
            total_enqueued: AtomicU64::new(0),
            total_claimed: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_retried: AtomicU64::new(0),
            total_stalled: AtomicU64::new(0),
            total_cancelled: AtomicU64::new(0),
            total_removed: AtomicU64::new(0),
            quota_rejections: AtomicU64::new(0),
            latency_sum: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn record_enqueue(&self) {
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_claim(&self) {
        self.total_claimed.fetch_add(1, Ordering::Relaxed);
    }

    /// `latency` is enqueue-to-completion time.
    #[inline(always)]
    pub fn record_complete(&self, latency: u64) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);
        self.latency_sum.fetch_add(latency, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_fail(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_retry(&self) {
        self.total_retried.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_stall(&self) {
        self.total_stalled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_cancel(&self) {
        self.total_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_removed(&self, count: u64) {
        self.total_removed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_quota_rejection(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let avg_latency_ms = if latency_count > 0 {
            self.latency_sum.load(Ordering::Relaxed) as f64 / latency_count as f64
        } else {
            0.0
        };
        MetricsSnapshot {
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_claimed: self.total_claimed.load(Ordering::Relaxed),
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_retried: self.total_retried.load(Ordering::Relaxed),
            total_stalled: self.total_stalled.load(Ordering::Relaxed),
            total_cancelled: self.total_cancelled.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
            quota_rejections: self.quota_rejections.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self::new()
    }
}
