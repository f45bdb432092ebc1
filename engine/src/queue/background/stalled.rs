//! Stall detection: active jobs whose lock expired without renewal.

use tracing::warn;

use super::super::manager::QueueManager;
use super::super::store::{StallOutcome, StallRecovery};
use crate::error::Result;
use crate::protocol::JobEventKind;

impl QueueManager {
    /// Requeue every stalled job in `queue`, or fail it once it has stalled
    /// more than `max_stalled_count` times.
    pub async fn check_stalled_jobs(&self, queue: &str) -> Result<Vec<StallRecovery>> {
        let entry = self.queue(queue)?;
        let now = self.now_ms();
        let recovered = self
            .store
            .recover_stalled(queue, now, entry.config.max_stalled_count)
            .await?;

        for recovery in &recovered {
            let job = &recovery.job;
            self.metrics.record_stall();
            self.emit(JobEventKind::Stalled, job, None);

            match recovery.outcome {
                StallOutcome::Requeued => {
                    warn!(
                        queue = %queue,
                        job_id = job.id,
                        stall_count = job.stall_count,
                        "Job stalled, requeued"
                    );
                }
                StallOutcome::Failed => {
                    self.metrics.record_fail();
                    warn!(
                        queue = %queue,
                        job_id = job.id,
                        stall_count = job.stall_count,
                        "Job stalled too many times, failed"
                    );
                    self.emit(JobEventKind::Failed, job, job.last_error.clone());
                }
            }
        }

        if recovered
            .iter()
            .any(|r| r.outcome == StallOutcome::Requeued)
        {
            self.notify_queue(&entry);
        }
        Ok(recovered)
    }
}
