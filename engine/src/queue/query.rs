//! Read-only job queries.

use super::manager::QueueManager;
use crate::error::Result;
use crate::protocol::{JobRecord, JobState};

impl QueueManager {
    /// Job by id, or `None` when it does not exist in this queue.
    pub async fn get_job(&self, queue: &str, id: u64) -> Result<Option<JobRecord>> {
        self.queue(queue)?;
        self.job_in_queue(queue, id).await
    }

    /// A user's jobs in `queue`, newest first. Empty `states` means every state.
    pub async fn list_jobs(
        &self,
        queue: &str,
        user_id: &str,
        states: &[JobState],
    ) -> Result<Vec<JobRecord>> {
        self.queue(queue)?;
        let mut jobs = self.store.list_by_user(queue, user_id).await?;
        if !states.is_empty() {
            jobs.retain(|j| states.contains(&j.state));
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    /// All jobs of one state in `queue`, oldest first.
    pub async fn list_by_state(&self, queue: &str, state: JobState) -> Result<Vec<JobRecord>> {
        self.queue(queue)?;
        Ok(self.store.list_by_state(queue, state).await?)
    }
}
