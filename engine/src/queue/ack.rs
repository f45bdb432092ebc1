//! Terminal and retry transitions reported by processors.

use serde_json::Value;
use tracing::{debug, warn};

use super::manager::QueueManager;
use crate::error::Result;
use crate::protocol::{JobEventKind, JobRecord, JobState};

/// Longest error summary stored on a job.
pub const MAX_ERROR_SUMMARY: usize = 512;

/// Collapse an error message to one readable line of bounded length.
pub fn summarize_error(message: &str) -> String {
    let line = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.is_empty() {
        return "unknown error".to_string();
    }
    if line.chars().count() <= MAX_ERROR_SUMMARY {
        return line;
    }
    let mut short: String = line.chars().take(MAX_ERROR_SUMMARY - 3).collect();
    short.push_str("...");
    short
}

impl QueueManager {
    pub async fn complete(
        &self,
        job: &JobRecord,
        worker_id: &str,
        result: Option<Value>,
    ) -> Result<JobRecord> {
        let now = self.now_ms();
        let done = self.store.complete(job.id, worker_id, now, result).await?;
        self.metrics
            .record_complete(now.saturating_sub(done.created_at));
        debug!(queue = %done.queue_name, job_id = done.id, "Job completed");
        self.emit(JobEventKind::Completed, &done, None);
        Ok(done)
    }

    /// Record a failed attempt: schedule a backoff retry while attempts
    /// remain, otherwise fail the job for good.
    pub async fn fail(&self, job: &JobRecord, worker_id: &str, error: &str) -> Result<JobRecord> {
        let now = self.now_ms();
        let summary = summarize_error(error);
        let retry_delay = job
            .has_retries_left()
            .then(|| job.backoff.delay_for(job.attempts_made));

        let failed = self
            .store
            .fail(job.id, worker_id, now, &summary, retry_delay)
            .await?;

        if failed.state == JobState::Delayed {
            self.metrics.record_retry();
            warn!(
                queue = %failed.queue_name,
                job_id = failed.id,
                attempts_made = failed.attempts_made,
                max_attempts = failed.max_attempts,
                retry_in_ms = retry_delay.unwrap_or(0),
                error = %summary,
                "Job failed, retry scheduled"
            );
            self.emit(JobEventKind::Retrying, &failed, Some(summary));
            if let Ok(entry) = self.queue(&failed.queue_name) {
                self.notify_queue(&entry);
            }
        } else {
            self.metrics.record_fail();
            warn!(
                queue = %failed.queue_name,
                job_id = failed.id,
                attempts_made = failed.attempts_made,
                error = %summary,
                "Job failed permanently"
            );
            self.emit(JobEventKind::Failed, &failed, Some(summary));
        }
        Ok(failed)
    }

    /// Close out an active job whose processor stopped on cancellation.
    pub async fn finish_cancelled(&self, job: &JobRecord, worker_id: &str) -> Result<JobRecord> {
        let now = self.now_ms();
        let cancelled = self.store.finish_cancelled(job.id, worker_id, now).await?;
        self.metrics.record_cancel();
        debug!(queue = %cancelled.queue_name, job_id = cancelled.id, "Active job cancelled");
        self.emit(JobEventKind::Cancelled, &cancelled, None);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_is_one_bounded_line() {
        assert_eq!(summarize_error("boom\n  at line 3\n"), "boom at line 3");
        assert_eq!(summarize_error("   "), "unknown error");
        let long = "x".repeat(2000);
        let s = summarize_error(&long);
        assert_eq!(s.chars().count(), MAX_ERROR_SUMMARY);
        assert!(s.ends_with("..."));
    }
}
