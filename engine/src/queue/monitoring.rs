//! Monitoring operations.
//!
//! Per-queue state counts come from the store and are eventually
//! consistent; global counters come from `GlobalMetrics`.

use super::manager::QueueManager;
use super::types::MetricsSnapshot;
use crate::error::Result;
use crate::protocol::{QueueInfo, QueueStats};

impl QueueManager {
    /// Job counts by state. Waiting jobs of a paused queue are reported as `paused`.
    pub async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let entry = self.queue(queue)?;
        let counts = self.store.counts(queue).await?;
        let (waiting, paused) = if entry.is_paused() {
            (0, counts.queued)
        } else {
            (counts.queued, 0)
        };
        Ok(QueueStats {
            waiting,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            delayed: counts.delayed,
            paused,
            cancelled: counts.cancelled,
            total: counts.total(),
        })
    }

    /// Every registered queue with its settings and current stats.
    pub async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
        let mut entries = self.queue_entries();
        entries.sort_by(|a, b| a.config.name.cmp(&b.config.name));

        let mut queues = Vec::with_capacity(entries.len());
        for entry in entries {
            let stats = self.get_queue_stats(&entry.config.name).await?;
            queues.push(QueueInfo {
                name: entry.config.name.to_string(),
                paused: entry.is_paused(),
                concurrency: entry.config.concurrency,
                quota_limit: entry.config.quota.map(|q| q.limit),
                stats,
            });
        }
        Ok(queues)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
