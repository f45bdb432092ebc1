//! Durable queue store abstraction.
//!
//! Every method is one atomic operation against the store: claim, renew,
//! complete, fail and stall recovery are each a single compare-and-swap on
//! the job's state and lock owner. Callers pass `now` in, so the store
//! never reads a clock of its own.

mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::protocol::{JobRecord, JobState, Progress};

pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of a lock renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRenewal {
    /// Lock extended; carries the job's cancellation flag so remote cancels reach the worker.
    Renewed { cancel_requested: bool },
    /// The caller no longer owns the job.
    Lost,
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// Queued or delayed job moved straight to `cancelled`.
    Cancelled(JobRecord),
    /// Active job flagged; the processor must observe it.
    Flagged(JobRecord),
    /// Nothing changed (already terminal or already flagged).
    Unchanged(JobState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallOutcome {
    Requeued,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StallRecovery {
    pub job: JobRecord,
    pub outcome: StallOutcome,
}

/// Per-state record counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub queued: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.queued + self.active + self.delayed + self.completed + self.failed + self.cancelled
    }
}

/// Durable queue store contract.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    // ============== Records ==============

    async fn next_id(&self) -> StoreResult<u64>;

    async fn insert(&self, job: JobRecord) -> StoreResult<()>;

    async fn get(&self, id: u64) -> StoreResult<Option<JobRecord>>;

    async fn list_by_state(&self, queue: &str, state: JobState) -> StoreResult<Vec<JobRecord>>;

    async fn list_by_user(&self, queue: &str, user_id: &str) -> StoreResult<Vec<JobRecord>>;

    async fn counts(&self, queue: &str) -> StoreResult<StateCounts>;

    // ============== Lifecycle ==============

    /// Claim the oldest eligible job (queued, or delayed and due) and lock it.
    async fn claim_next(
        &self,
        queue: &str,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<Option<JobRecord>>;

    async fn renew_lock(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<LockRenewal>;

    async fn update_progress(&self, id: u64, worker_id: &str, progress: Progress)
        -> StoreResult<()>;

    async fn complete(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        result: Option<Value>,
    ) -> StoreResult<JobRecord>;

    /// Record a failed attempt. `Some(delay)` schedules a retry, `None` makes the failure terminal.
    async fn fail(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        error: &str,
        retry_delay: Option<u64>,
    ) -> StoreResult<JobRecord>;

    /// Active job whose processor observed cancellation.
    async fn finish_cancelled(&self, id: u64, worker_id: &str, now: u64)
        -> StoreResult<JobRecord>;

    async fn cancel(&self, id: u64, now: u64) -> StoreResult<CancelOutcome>;

    /// Move a terminal `failed` job back to `queued` with a new attempt budget.
    /// Returns `None` when the job is not in `failed`.
    async fn requeue(&self, id: u64, now: u64, max_attempts: u32)
        -> StoreResult<Option<JobRecord>>;

    /// Requeue or fail every active job whose lock expired before `now`.
    async fn recover_stalled(
        &self,
        queue: &str,
        now: u64,
        max_stalled_count: u32,
    ) -> StoreResult<Vec<StallRecovery>>;

    async fn remove(&self, id: u64) -> StoreResult<Option<JobRecord>>;

    /// Remove only if the job is still in `state`.
    async fn remove_if_state(&self, id: u64, state: JobState) -> StoreResult<bool>;

    // ============== Ephemeral TTL entries ==============

    async fn put_ephemeral(&self, key: &str, value: Value, now: u64, ttl_ms: u64)
        -> StoreResult<()>;

    async fn get_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>>;

    async fn take_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>>;

    async fn purge_ephemeral(&self, now: u64) -> StoreResult<usize>;
}
