//! Core protocol types for mediaq.
//!
//! Contains JobRecord, JobState, progress and stats structures.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job state enum - the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,    // Claimable now
    Active,    // Claimed by a worker, lock held
    Delayed,   // Claimable once run_at has passed (retry backoff or initial delay)
    Completed, // Terminal
    Failed,    // Terminal, attempts or stalls exhausted
    Cancelled, // Terminal, owner-initiated
    Stalled,   // Transient, reported by the stall sweep only
}

impl JobState {
    pub const TERMINAL: [JobState; 3] = [JobState::Completed, JobState::Failed, JobState::Cancelled];

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Stalled => "stalled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "waiting" => Some(JobState::Queued),
            "active" => Some(JobState::Active),
            "delayed" => Some(JobState::Delayed),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" | "canceled" => Some(JobState::Cancelled),
            "stalled" => Some(JobState::Stalled),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub ceiling_ms: u64,
}

impl BackoffPolicy {
    /// Delay before the next attempt: `base * 2^attempts_made`, capped at the ceiling.
    #[inline]
    pub fn delay_for(&self, attempts_made: u32) -> u64 {
        let factor = 1u64 << attempts_made.min(32);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.ceiling_ms)
    }
}

/// Persisted job progress, polled by external clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extra progress fields a processor may report alongside the percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMeta {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_item: Option<String>,
    #[serde(default)]
    pub total_items: Option<u32>,
    #[serde(default)]
    pub completed_items: Option<u32>,
}

impl Progress {
    pub fn from_update(percent: u8, meta: ProgressMeta) -> Self {
        Self {
            percent: percent.min(100),
            status: meta.status,
            current_item: meta.current_item,
            total_items: meta.total_items,
            completed_items: meta.completed_items,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: u64,
    pub queue_name: CompactString,
    /// Owner, copied from `payload.userId` at admission.
    pub user_id: String,
    pub payload: Value,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub created_at: u64,
    /// Earliest time the job may be claimed.
    pub run_at: u64,
    #[serde(default)]
    pub processed_at: Option<u64>,
    #[serde(default)]
    pub finished_at: Option<u64>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub lock_owner: Option<String>,
    #[serde(default)]
    pub lock_expires_at: Option<u64>,
    #[serde(default)]
    pub stall_count: u32,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub manual_retries: u32,
    #[serde(default)]
    pub result: Option<Value>,
}

impl JobRecord {
    /// Eligible for claiming at `now`.
    #[inline]
    pub fn is_claimable(&self, now: u64) -> bool {
        match self.state {
            JobState::Queued => true,
            JobState::Delayed => self.run_at <= now,
            _ => false,
        }
    }

    /// Holds a lock that has not expired at `now`.
    #[inline]
    pub fn has_live_lock(&self, now: u64) -> bool {
        self.state == JobState::Active && self.lock_expires_at.is_some_and(|t| t >= now)
    }

    #[inline]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Attempts are exhausted once the next failure would reach `max_attempts`.
    #[inline]
    pub fn has_retries_left(&self) -> bool {
        self.attempts_made + 1 < self.max_attempts
    }
}

/// Returned by admission and manual retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: u64,
    pub queue: String,
    pub state: JobState,
}

/// Per-job overrides supplied at admission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub backoff_ceiling_ms: Option<u64>,
    /// Initial delay; the job starts out delayed.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Per-state counts for one queue. Eventually consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub paused: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Queue summary for listing.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub paused: bool,
    pub concurrency: u32,
    pub quota_limit: Option<u32>,
    pub stats: QueueStats,
}

// === Events ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    Enqueued,
    Active,
    Progress,
    Completed,
    Retrying,
    Failed,
    Stalled,
    Cancelled,
    Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub queue: String,
    pub job_id: u64,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === Worker Registration ===

#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub id: String,
    pub queue: String,
    pub concurrency: u32,
    pub started_at: u64,
    pub jobs_processed: u64,
}
