//! Job admission.

use serde_json::Value;
use tracing::{debug, warn};

use super::manager::QueueManager;
use super::validation::{validate_options, validate_payload};
use crate::error::{QueueError, Result};
use crate::protocol::{JobBuilder, JobEventKind, JobHandle, JobOptions};

impl QueueManager {
    /// Admit a job: validate, charge the owner's quota, persist as queued
    /// (or delayed) and wake the queue's dispatchers.
    pub async fn enqueue(
        &self,
        queue: &str,
        payload: Value,
        options: Option<JobOptions>,
    ) -> Result<JobHandle> {
        let entry = self.queue(queue)?;
        let config = &entry.config;
        let user_id = validate_payload(config.schema, &payload)?;
        let options = options.unwrap_or_default();
        validate_options(&options)?;

        // Take the id first so an unreachable store never costs quota.
        let id = self.store.next_id().await?;
        let now = self.now_ms();
        let charged = match config.quota {
            Some(quota) => match self.quota.admit(&user_id, &quota, now).await {
                Ok(decision) => Some((quota, decision)),
                Err(e) => {
                    if matches!(e, QueueError::QuotaExceeded { .. }) {
                        self.metrics.record_quota_rejection();
                        warn!(queue = %queue, user_id = %user_id, "Admission rejected by quota");
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let job = JobBuilder::new(config.name.clone(), user_id.clone(), payload)
            .retry(&config.retry)
            .options(&options)
            .build(id, now);
        let handle = JobHandle {
            id,
            queue: queue.to_string(),
            state: job.state,
        };

        if let Err(e) = self.store.insert(job.clone()).await {
            if let Some((quota, decision)) = charged {
                if let Err(release_err) = self.quota.release(&user_id, &quota, &decision).await {
                    warn!(
                        queue = %queue,
                        user_id = %user_id,
                        error = %release_err,
                        "Failed to release quota after rejected insert"
                    );
                }
            }
            return Err(e.into());
        }
        self.metrics.record_enqueue();
        debug!(queue = %queue, job_id = id, state = %job.state, "Job enqueued");
        self.emit(JobEventKind::Enqueued, &job, None);
        self.notify_queue(&entry);
        Ok(handle)
    }
}
