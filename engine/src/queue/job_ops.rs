//! Owner-initiated job operations and queue control.
//!
//! Every mutating call checks `payload.userId` against the caller before
//! touching the store, so a forbidden request leaves no trace.

use serde_json::Value;
use tracing::{debug, info};

use super::manager::QueueManager;
use super::quota::ensure_owner;
use super::store::CancelOutcome;
use crate::error::{QueueError, Result};
use crate::protocol::{JobEventKind, JobHandle, JobRecord, JobState};

const SESSION_PREFIX: &str = "session:";

impl QueueManager {
    async fn owned_job(&self, queue: &str, id: u64, user_id: &str) -> Result<JobRecord> {
        self.queue(queue)?;
        let job = self
            .job_in_queue(queue, id)
            .await?
            .ok_or(QueueError::NotFound(id))?;
        ensure_owner(&job, user_id)?;
        Ok(job)
    }

    /// Cancel a job. Queued and delayed jobs become `cancelled` at once;
    /// an active job is flagged and its processor must stop cooperatively.
    /// Returns false when there was nothing left to cancel.
    pub async fn cancel(&self, queue: &str, id: u64, user_id: &str) -> Result<bool> {
        self.owned_job(queue, id, user_id).await?;
        let now = self.now_ms();

        match self.store.cancel(id, now).await? {
            CancelOutcome::Cancelled(job) => {
                self.metrics.record_cancel();
                debug!(queue = %queue, job_id = id, "Job cancelled before start");
                self.emit(JobEventKind::Cancelled, &job, None);
                Ok(true)
            }
            CancelOutcome::Flagged(_) => {
                if let Some(running) = self.job_tokens.get(&id) {
                    running.1.cancel();
                }
                debug!(queue = %queue, job_id = id, "Cancellation requested for active job");
                Ok(true)
            }
            CancelOutcome::Unchanged(state) => {
                debug!(queue = %queue, job_id = id, state = %state, "Cancel ignored");
                Ok(false)
            }
        }
    }

    /// Requeue a terminally failed job under the same id. `attemptsMade` is
    /// kept; the job gets a fresh automatic retry budget on top of it.
    pub async fn retry(&self, queue: &str, id: u64, user_id: &str) -> Result<Option<JobHandle>> {
        let job = self.owned_job(queue, id, user_id).await?;
        if job.state != JobState::Failed {
            return Ok(None);
        }
        let entry = self.queue(queue)?;
        let max_attempts = job.attempts_made.saturating_add(entry.config.retry.max_attempts);
        let now = self.now_ms();

        let Some(job) = self.store.requeue(id, now, max_attempts).await? else {
            return Ok(None);
        };
        info!(
            queue = %queue,
            job_id = id,
            attempts_made = job.attempts_made,
            manual_retries = job.manual_retries,
            "Job manually retried"
        );
        self.emit(JobEventKind::Enqueued, &job, None);
        self.notify_queue(&entry);
        Ok(Some(JobHandle {
            id,
            queue: queue.to_string(),
            state: job.state,
        }))
    }

    /// Delete a job that is not running.
    pub async fn delete(&self, queue: &str, id: u64, user_id: &str) -> Result<bool> {
        let job = self.owned_job(queue, id, user_id).await?;
        if job.state == JobState::Active {
            return Err(QueueError::Conflict {
                id,
                state: job.state,
            });
        }
        if !self.store.remove_if_state(id, job.state).await? {
            return Ok(false);
        }
        self.metrics.record_removed(1);
        debug!(queue = %queue, job_id = id, "Job deleted");
        self.emit(JobEventKind::Removed, &job, None);
        Ok(true)
    }

    // ============== Queue control ==============

    pub fn pause(&self, queue: &str) -> Result<()> {
        let entry = self.queue(queue)?;
        if !entry.paused.swap(true, std::sync::atomic::Ordering::AcqRel) {
            info!(queue = %queue, "Queue paused");
        }
        Ok(())
    }

    pub fn resume(&self, queue: &str) -> Result<()> {
        let entry = self.queue(queue)?;
        if entry.paused.swap(false, std::sync::atomic::Ordering::AcqRel) {
            info!(queue = %queue, "Queue resumed");
            self.notify_queue(&entry);
        }
        Ok(())
    }

    pub fn is_paused(&self, queue: &str) -> Result<bool> {
        Ok(self.queue(queue)?.is_paused())
    }

    // ============== Sessions ==============

    /// Short-lived session state (e.g. a PIN polling flow) kept in the
    /// store's TTL space next to the jobs.
    pub async fn put_session(&self, key: &str, value: Value, ttl_ms: u64) -> Result<()> {
        let now = self.now_ms();
        self.store
            .put_ephemeral(&session_key(key), value, now, ttl_ms)
            .await?;
        Ok(())
    }

    pub async fn get_session(&self, key: &str) -> Result<Option<Value>> {
        let now = self.now_ms();
        Ok(self.store.get_ephemeral(&session_key(key), now).await?)
    }

    /// Read and remove in one step (single-use codes).
    pub async fn take_session(&self, key: &str) -> Result<Option<Value>> {
        let now = self.now_ms();
        Ok(self.store.take_ephemeral(&session_key(key), now).await?)
    }
}

#[inline]
fn session_key(key: &str) -> String {
    format!("{}{}", SESSION_PREFIX, key)
}
