//! Retention sweeps for terminal jobs and purge of expired sessions.

use tracing::{debug, warn};

use super::super::manager::QueueManager;
use crate::config::RetentionRule;
use crate::error::Result;
use crate::protocol::{JobEventKind, JobState};

impl QueueManager {
    /// Remove terminal jobs past their age limit or beyond the newest
    /// `max_count` of their state. Non-terminal jobs are never touched.
    pub async fn sweep_retention(&self, queue: &str) -> Result<usize> {
        let entry = self.queue(queue)?;
        let policy = entry.config.retention;
        let rules = [
            (JobState::Completed, policy.completed),
            (JobState::Failed, policy.failed),
            (JobState::Cancelled, policy.cancelled),
        ];

        let mut removed = 0;
        for (state, rule) in rules {
            removed += self.sweep_state(queue, state, rule).await?;
        }

        if removed > 0 {
            self.metrics.record_removed(removed as u64);
            debug!(queue = %queue, removed, "Retention sweep finished");
        }
        Ok(removed)
    }

    async fn sweep_state(&self, queue: &str, state: JobState, rule: RetentionRule) -> Result<usize> {
        if rule.max_age_ms.is_none() && rule.max_count.is_none() {
            return Ok(0);
        }
        let now = self.now_ms();
        let mut jobs = self.store.list_by_state(queue, state).await?;
        // Newest first
        jobs.sort_by(|a, b| {
            let fa = a.finished_at.unwrap_or(a.created_at);
            let fb = b.finished_at.unwrap_or(b.created_at);
            fb.cmp(&fa).then(b.id.cmp(&a.id))
        });

        let mut removed = 0;
        for (rank, job) in jobs.iter().enumerate() {
            let finished = job.finished_at.unwrap_or(job.created_at);
            let too_old = rule
                .max_age_ms
                .is_some_and(|age| now.saturating_sub(finished) > age);
            let over_count = rule.max_count.is_some_and(|max| rank >= max);
            if !(too_old || over_count) {
                continue;
            }
            if self.store.remove_if_state(job.id, state).await? {
                removed += 1;
                self.emit(JobEventKind::Removed, job, None);
            }
        }
        Ok(removed)
    }

    pub(crate) async fn purge_expired_sessions(&self) {
        let now = self.now_ms();
        match self.store.purge_ephemeral(now).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Expired sessions purged"),
            Err(e) => warn!(error = %e, "Session purge failed"),
        }
    }
}
