//! In-process store.
//!
//! One `RwLock<QueueShard>` per queue holds that queue's records and its
//! eligibility set ordered by `(run_at, id)`. Every transition happens under
//! the shard write lock, which makes each call a single atomic step. A
//! lock-free `DashMap` maps job ids to their queue.

use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use compact_str::CompactString;
use dashmap::DashMap;
use gxhash::GxHasher;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    CancelOutcome, LockRenewal, StallOutcome, StallRecovery, StateCounts, Store, StoreResult,
};
use crate::error::{QueueError, StoreError};
use crate::protocol::{JobRecord, JobState, Progress};
use crate::queue::quota::{QuotaDecision, QuotaStore, UserQuota};
use crate::queue::types::GxHashMap;

type GxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<GxHasher>>;

pub const STALL_LIMIT_REASON: &str = "job stalled more than allowable limit (too many stalls)";

#[derive(Default)]
struct QueueShard {
    jobs: GxHashMap<u64, JobRecord>,
    /// Queued and delayed jobs keyed by `(run_at, id)`.
    eligible: BTreeSet<(u64, u64)>,
}

impl QueueShard {
    /// Borrow an active job, checking the caller still holds its lock.
    fn owned_active(&mut self, id: u64, worker_id: &str) -> StoreResult<&mut JobRecord> {
        let job = self.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if job.state != JobState::Active || job.lock_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::LockMismatch(id));
        }
        Ok(job)
    }
}

pub struct MemoryStore {
    shards: GxDashMap<CompactString, Arc<RwLock<QueueShard>>>,
    job_index: GxDashMap<u64, CompactString>,
    id_counter: AtomicU64,
    ephemeral: GxDashMap<String, (Value, u64)>,
    quotas: GxDashMap<String, UserQuota>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: DashMap::with_capacity_and_hasher(16, Default::default()),
            job_index: DashMap::with_capacity_and_hasher(4096, Default::default()),
            id_counter: AtomicU64::new(1),
            ephemeral: DashMap::with_capacity_and_hasher(64, Default::default()),
            quotas: DashMap::with_capacity_and_hasher(256, Default::default()),
        }
    }

    fn shard(&self, queue: &str) -> Arc<RwLock<QueueShard>> {
        if let Some(shard) = self.shards.get(queue) {
            return Arc::clone(shard.value());
        }
        Arc::clone(
            self.shards
                .entry(CompactString::from(queue))
                .or_default()
                .value(),
        )
    }

    fn shard_of(&self, id: u64) -> StoreResult<Arc<RwLock<QueueShard>>> {
        let queue = self
            .job_index
            .get(&id)
            .map(|q| q.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        Ok(self.shard(&queue))
    }

    /// Number of live job records across all queues.
    pub fn len(&self) -> usize {
        self.job_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_index.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn next_id(&self) -> StoreResult<u64> {
        Ok(self.id_counter.fetch_add(1, Ordering::Relaxed))
    }

    async fn insert(&self, job: JobRecord) -> StoreResult<()> {
        let shard = self.shard(&job.queue_name);
        let mut s = shard.write();
        if job.is_claimable(u64::MAX) {
            s.eligible.insert((job.run_at, job.id));
        }
        self.job_index.insert(job.id, job.queue_name.clone());
        s.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: u64) -> StoreResult<Option<JobRecord>> {
        let Ok(shard) = self.shard_of(id) else {
            return Ok(None);
        };
        let s = shard.read();
        Ok(s.jobs.get(&id).cloned())
    }

    async fn list_by_state(&self, queue: &str, state: JobState) -> StoreResult<Vec<JobRecord>> {
        let shard = self.shard(queue);
        let s = shard.read();
        let mut jobs: Vec<JobRecord> = s
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_by_user(&self, queue: &str, user_id: &str) -> StoreResult<Vec<JobRecord>> {
        let shard = self.shard(queue);
        let s = shard.read();
        let mut jobs: Vec<JobRecord> = s
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn counts(&self, queue: &str) -> StoreResult<StateCounts> {
        let shard = self.shard(queue);
        let s = shard.read();
        let mut counts = StateCounts::default();
        for job in s.jobs.values() {
            match job.state {
                JobState::Queued => counts.queued += 1,
                JobState::Active | JobState::Stalled => counts.active += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }

    async fn claim_next(
        &self,
        queue: &str,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<Option<JobRecord>> {
        let shard = self.shard(queue);
        let mut s = shard.write();

        while let Some(&(run_at, id)) = s.eligible.first() {
            if run_at > now {
                return Ok(None);
            }
            s.eligible.remove(&(run_at, id));

            // Skip keys left behind by records that moved on.
            let Some(job) = s.jobs.get_mut(&id) else {
                continue;
            };
            if !job.is_claimable(now) || job.run_at != run_at {
                continue;
            }
            job.state = JobState::Active;
            job.processed_at = Some(now);
            job.lock_owner = Some(worker_id.to_string());
            job.lock_expires_at = Some(now.saturating_add(lock_duration));
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn renew_lock(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<LockRenewal> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        match s.owned_active(id, worker_id) {
            Ok(job) => {
                job.lock_expires_at = Some(now.saturating_add(lock_duration));
                Ok(LockRenewal::Renewed {
                    cancel_requested: job.cancel_requested,
                })
            }
            Err(StoreError::LockMismatch(_)) => Ok(LockRenewal::Lost),
            Err(e) => Err(e),
        }
    }

    async fn update_progress(
        &self,
        id: u64,
        worker_id: &str,
        progress: Progress,
    ) -> StoreResult<()> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let job = s.owned_active(id, worker_id)?;
        job.progress = progress;
        Ok(())
    }

    async fn complete(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        result: Option<Value>,
    ) -> StoreResult<JobRecord> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let job = s.owned_active(id, worker_id)?;
        job.state = JobState::Completed;
        job.finished_at = Some(now);
        job.lock_owner = None;
        job.lock_expires_at = None;
        job.progress.percent = 100;
        job.result = result;
        Ok(job.clone())
    }

    async fn fail(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        error: &str,
        retry_delay: Option<u64>,
    ) -> StoreResult<JobRecord> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let snapshot = {
            let job = s.owned_active(id, worker_id)?;
            job.attempts_made = job.attempts_made.saturating_add(1).min(job.max_attempts);
            job.last_error = Some(error.to_string());
            job.progress.error = Some(error.to_string());
            job.lock_owner = None;
            job.lock_expires_at = None;
            match retry_delay {
                Some(delay) => {
                    job.state = JobState::Delayed;
                    job.run_at = now.saturating_add(delay);
                }
                None => {
                    job.state = JobState::Failed;
                    job.finished_at = Some(now);
                }
            }
            job.clone()
        };
        if snapshot.state == JobState::Delayed {
            s.eligible.insert((snapshot.run_at, snapshot.id));
        }
        Ok(snapshot)
    }

    async fn finish_cancelled(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
    ) -> StoreResult<JobRecord> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let job = s.owned_active(id, worker_id)?;
        job.state = JobState::Cancelled;
        job.finished_at = Some(now);
        job.lock_owner = None;
        job.lock_expires_at = None;
        Ok(job.clone())
    }

    async fn cancel(&self, id: u64, now: u64) -> StoreResult<CancelOutcome> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let job = s.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let outcome = match job.state {
            JobState::Queued | JobState::Delayed => {
                let key = (job.run_at, job.id);
                job.state = JobState::Cancelled;
                job.cancel_requested = true;
                job.finished_at = Some(now);
                let record = job.clone();
                s.eligible.remove(&key);
                CancelOutcome::Cancelled(record)
            }
            JobState::Active if !job.cancel_requested => {
                job.cancel_requested = true;
                CancelOutcome::Flagged(job.clone())
            }
            state => CancelOutcome::Unchanged(state),
        };
        Ok(outcome)
    }

    async fn requeue(
        &self,
        id: u64,
        now: u64,
        max_attempts: u32,
    ) -> StoreResult<Option<JobRecord>> {
        let shard = self.shard_of(id)?;
        let mut s = shard.write();
        let record = {
            let job = s.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if job.state != JobState::Failed {
                return Ok(None);
            }
            job.state = JobState::Queued;
            job.run_at = now;
            job.max_attempts = max_attempts.max(job.attempts_made + 1);
            job.manual_retries += 1;
            job.stall_count = 0;
            job.cancel_requested = false;
            job.finished_at = None;
            job.processed_at = None;
            job.last_error = None;
            job.progress = Progress::default();
            job.result = None;
            job.clone()
        };
        s.eligible.insert((record.run_at, record.id));
        Ok(Some(record))
    }

    async fn recover_stalled(
        &self,
        queue: &str,
        now: u64,
        max_stalled_count: u32,
    ) -> StoreResult<Vec<StallRecovery>> {
        let shard = self.shard(queue);
        let mut s = shard.write();

        let expired: Vec<u64> = s
            .jobs
            .values()
            .filter(|j| j.state == JobState::Active && j.lock_expires_at.map_or(true, |t| t < now))
            .map(|j| j.id)
            .collect();

        let mut recovered = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(job) = s.jobs.get_mut(&id) else {
                continue;
            };
            job.stall_count += 1;
            job.lock_owner = None;
            job.lock_expires_at = None;
            let outcome = if job.stall_count > max_stalled_count {
                job.state = JobState::Failed;
                job.finished_at = Some(now);
                job.last_error = Some(STALL_LIMIT_REASON.to_string());
                job.progress.error = Some(STALL_LIMIT_REASON.to_string());
                StallOutcome::Failed
            } else {
                job.state = JobState::Queued;
                job.run_at = now;
                job.last_error = Some(
                    QueueError::Stalled(format!(
                        "lock expired (stall {} of {})",
                        job.stall_count, max_stalled_count
                    ))
                    .to_string(),
                );
                StallOutcome::Requeued
            };
            let record = job.clone();
            if outcome == StallOutcome::Requeued {
                s.eligible.insert((record.run_at, record.id));
            }
            recovered.push(StallRecovery {
                job: record,
                outcome,
            });
        }
        Ok(recovered)
    }

    async fn remove(&self, id: u64) -> StoreResult<Option<JobRecord>> {
        let Ok(shard) = self.shard_of(id) else {
            return Ok(None);
        };
        let mut s = shard.write();
        let removed = s.jobs.remove(&id);
        if let Some(ref job) = removed {
            s.eligible.remove(&(job.run_at, job.id));
            self.job_index.remove(&id);
        }
        Ok(removed)
    }

    async fn remove_if_state(&self, id: u64, state: JobState) -> StoreResult<bool> {
        let Ok(shard) = self.shard_of(id) else {
            return Ok(false);
        };
        let mut s = shard.write();
        if s.jobs.get(&id).is_some_and(|j| j.state == state) {
            if let Some(job) = s.jobs.remove(&id) {
                s.eligible.remove(&(job.run_at, job.id));
            }
            self.job_index.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn put_ephemeral(
        &self,
        key: &str,
        value: Value,
        now: u64,
        ttl_ms: u64,
    ) -> StoreResult<()> {
        self.ephemeral
            .insert(key.to_string(), (value, now.saturating_add(ttl_ms)));
        Ok(())
    }

    async fn get_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>> {
        let hit = self
            .ephemeral
            .get(key)
            .map(|e| (e.value().0.clone(), e.value().1));
        match hit {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                self.ephemeral.remove_if(key, |_, e| e.1 <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn take_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>> {
        Ok(self
            .ephemeral
            .remove(key)
            .and_then(|(_, (value, expires_at))| (expires_at > now).then_some(value)))
    }

    async fn purge_ephemeral(&self, now: u64) -> StoreResult<usize> {
        let before = self.ephemeral.len();
        self.ephemeral.retain(|_, e| e.1 > now);
        Ok(before.saturating_sub(self.ephemeral.len()))
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn check_and_increment(
        &self,
        user_id: &str,
        limit: u32,
        window_ms: u64,
        now: u64,
    ) -> StoreResult<QuotaDecision> {
        let key = format!("{}:{}", user_id, window_ms);
        let mut entry = self
            .quotas
            .entry(key)
            .or_insert_with(|| UserQuota::new(user_id, now, limit));
        Ok(entry.value_mut().check_and_increment(now, limit, window_ms))
    }

    async fn release(&self, user_id: &str, window_ms: u64, reset_at: u64) -> StoreResult<()> {
        let key = format!("{}:{}", user_id, window_ms);
        if let Some(mut entry) = self.quotas.get_mut(&key) {
            entry.value_mut().release(reset_at, window_ms);
        }
        Ok(())
    }
}
