//! Job builder pattern for mediaq.
//!
//! Usage:
//!   JobBuilder::new("downloads", "user-1", json!({"userId": "user-1", ...}))
//!       .retry(&policy)
//!       .options(&opts)
//!       .build(job_id, now_ms)

use compact_str::CompactString;
use serde_json::Value;

use super::{BackoffPolicy, JobOptions, JobRecord, JobState, Progress};
use crate::config::RetryPolicy;

/// Builder for creating JobRecord instances.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    queue: CompactString,
    user_id: String,
    payload: Value,
    max_attempts: u32,
    base_delay_ms: u64,
    ceiling_ms: u64,
    delay: Option<u64>,
}

impl JobBuilder {
    /// Create a new JobBuilder with required queue, owner and payload.
    #[inline]
    pub fn new(queue: impl Into<CompactString>, user_id: impl Into<String>, payload: Value) -> Self {
        let defaults = RetryPolicy::default();
        Self {
            queue: queue.into(),
            user_id: user_id.into(),
            payload,
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay_ms,
            ceiling_ms: defaults.backoff_ceiling_ms,
            delay: None,
        }
    }

    /// Take attempts and backoff from the queue's retry policy.
    #[inline]
    pub fn retry(mut self, policy: &RetryPolicy) -> Self {
        self.max_attempts = policy.max_attempts;
        self.base_delay_ms = policy.base_delay_ms;
        self.ceiling_ms = policy.backoff_ceiling_ms;
        self
    }

    /// Apply per-job overrides.
    #[inline]
    pub fn options(mut self, opts: &JobOptions) -> Self {
        if let Some(n) = opts.max_attempts {
            self.max_attempts = n.max(1);
        }
        if let Some(d) = opts.base_delay_ms {
            self.base_delay_ms = d;
        }
        if let Some(c) = opts.backoff_ceiling_ms {
            self.ceiling_ms = c;
        }
        self.delay = opts.delay_ms.filter(|d| *d > 0);
        self
    }

    #[inline]
    pub fn delay(mut self, delay: u64) -> Self {
        self.delay = Some(delay).filter(|d| *d > 0);
        self
    }

    /// Build the record with the given ID and current timestamp.
    pub fn build(self, id: u64, now: u64) -> JobRecord {
        let (state, run_at) = match self.delay {
            Some(d) => (JobState::Delayed, now.saturating_add(d)),
            None => (JobState::Queued, now),
        };
        JobRecord {
            id,
            queue_name: self.queue,
            user_id: self.user_id,
            payload: self.payload,
            state,
            attempts_made: 0,
            max_attempts: self.max_attempts,
            backoff: BackoffPolicy {
                base_delay_ms: self.base_delay_ms,
                ceiling_ms: self.ceiling_ms.max(self.base_delay_ms),
            },
            created_at: now,
            run_at,
            processed_at: None,
            finished_at: None,
            progress: Progress::default(),
            last_error: None,
            lock_owner: None,
            lock_expires_at: None,
            stall_count: 0,
            cancel_requested: false,
            manual_retries: 0,
            result: None,
        }
    }
}
