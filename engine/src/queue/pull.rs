//! Claiming jobs and holding their locks.

use tracing::debug;

use super::manager::QueueManager;
use super::store::LockRenewal;
use crate::error::Result;
use crate::protocol::{JobEventKind, JobRecord, Progress, ProgressMeta};

impl QueueManager {
    /// Atomically claim the next eligible job for `worker_id`.
    /// Paused queues and a shut-down registry hand out nothing.
    pub async fn claim(&self, queue: &str, worker_id: &str) -> Result<Option<JobRecord>> {
        let entry = self.queue(queue)?;
        if entry.is_paused() || self.is_shutdown() {
            return Ok(None);
        }
        let now = self.now_ms();
        let claimed = self
            .store
            .claim_next(queue, worker_id, now, entry.config.lock_duration_ms)
            .await?;
        if let Some(ref job) = claimed {
            self.metrics.record_claim();
            debug!(
                queue = %queue,
                job_id = job.id,
                worker_id = %worker_id,
                attempt = job.attempts_made + 1,
                "Job claimed"
            );
            self.emit(JobEventKind::Active, job, None);
        }
        Ok(claimed)
    }

    /// Extend the lock on an active job for another `lock_duration`.
    pub async fn renew_lock(&self, job: &JobRecord, worker_id: &str) -> Result<LockRenewal> {
        let entry = self.queue(&job.queue_name)?;
        let now = self.now_ms();
        Ok(self
            .store
            .renew_lock(job.id, worker_id, now, entry.config.lock_duration_ms)
            .await?)
    }

    /// Persist progress for external pollers. Requires the lock.
    pub async fn update_progress(
        &self,
        job: &JobRecord,
        worker_id: &str,
        percent: u8,
        meta: ProgressMeta,
    ) -> Result<()> {
        let progress = Progress::from_update(percent, meta);
        let percent = progress.percent;
        self.store
            .update_progress(job.id, worker_id, progress.clone())
            .await?;
        if self.event_tx.receiver_count() > 0 {
            let mut snapshot = job.clone();
            snapshot.progress = progress;
            self.emit(JobEventKind::Progress, &snapshot, None);
        }
        debug!(job_id = job.id, percent, "Progress updated");
        Ok(())
    }
}
