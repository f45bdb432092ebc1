//! Worker pool: claim loops, lock renewal and processor dispatch.
//!
//! Each registered processor gets `concurrency` claim loops ("slots"). A slot
//! claims one job at a time, runs the handler in its own task, and keeps the
//! job's lock alive from a sibling renewal task until the handler returns.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::manager::{QueueEntry, QueueManager};
use super::store::LockRenewal;
use crate::error::{QueueError, Result};
use crate::protocol::{JobRecord, ProgressMeta, WorkerInfo};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Job handler. Any `Fn(JobContext) -> impl Future<Output = Result<Value>>`
/// closure qualifies.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, ctx: JobContext) -> Result<Value>;
}

#[async_trait]
impl<F, Fut> Processor for F
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn process(&self, ctx: JobContext) -> Result<Value> {
        (self)(ctx).await
    }
}

/// What a handler sees of its job.
#[derive(Clone)]
pub struct JobContext {
    job: Arc<JobRecord>,
    worker_id: Arc<str>,
    manager: Arc<QueueManager>,
    token: CancellationToken,
}

impl JobContext {
    #[inline]
    pub fn job(&self) -> &JobRecord {
        &self.job
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.job.id
    }

    #[inline]
    pub fn payload(&self) -> &Value {
        &self.job.payload
    }

    /// Attempts that already failed before this run.
    #[inline]
    pub fn attempts_made(&self) -> u32 {
        self.job.attempts_made
    }

    pub async fn update_progress(&self, percent: u8, meta: ProgressMeta) -> Result<()> {
        self.manager
            .update_progress(&self.job, &self.worker_id, percent, meta)
            .await
    }

    /// True once the owner cancelled the job or this worker lost its lock.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Handle to a registered processor pool.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub worker_id: String,
    pub queue: String,
    pub concurrency: u32,
    stop: CancellationToken,
}

impl WorkerHandle {
    /// Stop claiming. Jobs already running finish normally.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl QueueManager {
    /// Start `concurrency` claim loops running `handler` against `queue`.
    pub fn register_processor<P: Processor>(
        self: &Arc<Self>,
        queue: &str,
        concurrency: u32,
        handler: P,
    ) -> Result<WorkerHandle> {
        let entry = self.queue(queue)?;
        if self.is_shutdown() {
            return Err(QueueError::Validation("registry is shut down".into()));
        }
        let concurrency = concurrency.max(1);
        let worker_id = format!("{}-w{}", queue, WORKER_SEQ.fetch_add(1, Ordering::Relaxed));
        let stop = self.shutdown.child_token();
        let processor: Arc<dyn Processor> = Arc::new(handler);
        let live = Arc::new(AtomicUsize::new(concurrency as usize));

        self.workers.write().insert(
            worker_id.clone(),
            WorkerInfo {
                id: worker_id.clone(),
                queue: queue.to_string(),
                concurrency,
                started_at: self.now_ms(),
                jobs_processed: 0,
            },
        );

        let mut tasks = self.worker_tasks.lock();
        for slot in 0..concurrency {
            let slot = Slot {
                manager: Arc::clone(self),
                entry: Arc::clone(&entry),
                processor: Arc::clone(&processor),
                pool_id: worker_id.clone(),
                slot_id: format!("{}:{}", worker_id, slot),
                stop: stop.clone(),
                live: Arc::clone(&live),
            };
            tasks.push(tokio::spawn(slot.run()));
        }
        info!(queue = %queue, worker_id = %worker_id, concurrency, "Processor registered");

        Ok(WorkerHandle {
            worker_id,
            queue: queue.to_string(),
            concurrency,
            stop,
        })
    }

    pub fn list_workers(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self.workers.read().values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }
}

struct Slot {
    manager: Arc<QueueManager>,
    entry: Arc<QueueEntry>,
    processor: Arc<dyn Processor>,
    pool_id: String,
    slot_id: String,
    stop: CancellationToken,
    live: Arc<AtomicUsize>,
}

impl Slot {
    async fn run(self) {
        let queue = self.entry.config.name.clone();
        let poll = Duration::from_millis(self.entry.config.poll_interval_ms);
        let mut backoff = INITIAL_BACKOFF;
        debug!(queue = %queue, slot = %self.slot_id, "Claim loop started");

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            // Register for wake-ups before looking, so an enqueue between an
            // empty claim and the wait is not missed.
            let notified = self.entry.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.entry.is_paused() {
                tokio::select! {
                    _ = self.stop.cancelled() => break,
                    _ = &mut notified => {}
                    _ = sleep(poll) => {}
                }
                continue;
            }

            match self.manager.claim(&queue, &self.slot_id).await {
                Ok(Some(job)) => {
                    backoff = INITIAL_BACKOFF;
                    self.process(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = &mut notified => {}
                        _ = sleep(poll) => {}
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        queue = %queue,
                        slot = %self.slot_id,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Store unavailable, backing off"
                    );
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => {
                    error!(queue = %queue, slot = %self.slot_id, error = %e, "Claim failed");
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = sleep(poll) => {}
                    }
                }
            }
        }

        debug!(queue = %queue, slot = %self.slot_id, "Claim loop stopped");
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.manager.workers.write().remove(&self.pool_id);
        }
    }

    async fn process(&self, job: JobRecord) {
        let manager = &self.manager;
        let token = CancellationToken::new();
        manager
            .job_tokens
            .insert(job.id, (self.slot_id.clone(), token.clone()));

        let renewal = tokio::spawn(renew_lock_loop(
            Arc::clone(manager),
            job.clone(),
            self.slot_id.clone(),
            token.clone(),
            Duration::from_millis(self.entry.config.lock_renew_interval_ms),
        ));

        let ctx = JobContext {
            job: Arc::new(job.clone()),
            worker_id: Arc::from(self.slot_id.as_str()),
            manager: Arc::clone(manager),
            token: token.clone(),
        };
        let processor = Arc::clone(&self.processor);
        let outcome = match tokio::spawn(async move { processor.process(ctx).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(QueueError::Processing(format!("processor panicked: {}", e))),
        };

        renewal.abort();
        manager
            .job_tokens
            .remove_if(&job.id, |_, (slot, _)| *slot == self.slot_id);

        // Recorded in its own task so a panic there cannot end the claim loop.
        let recorder = {
            let manager = Arc::clone(manager);
            let job = job.clone();
            let slot_id = self.slot_id.clone();
            let cancelled = token.is_cancelled();
            tokio::spawn(async move {
                match outcome {
                    Ok(value) => {
                        let result = (!value.is_null()).then_some(value);
                        manager.complete(&job, &slot_id, result).await
                    }
                    Err(_) if cancelled => manager.finish_cancelled(&job, &slot_id).await,
                    Err(e) => manager.fail(&job, &slot_id, &processing_message(e)).await,
                }
            })
        };
        let transition = match recorder.await {
            Ok(transition) => transition,
            Err(e) => Err(QueueError::Processing(format!(
                "recording outcome panicked: {}",
                e
            ))),
        };

        match transition {
            Ok(_) => {
                if let Some(info) = manager.workers.write().get_mut(&self.pool_id) {
                    info.jobs_processed += 1;
                }
            }
            Err(QueueError::LockLost(id)) => {
                warn!(job_id = id, slot = %self.slot_id, "Lock lost before outcome was recorded; outcome discarded");
            }
            Err(e) => {
                error!(job_id = job.id, slot = %self.slot_id, error = %e, "Failed to record job outcome");
            }
        }
    }
}

fn processing_message(e: QueueError) -> String {
    match e {
        QueueError::Processing(msg) => msg,
        other => other.to_string(),
    }
}

/// Renew until aborted. Cancels the job token when the lock is lost or the
/// owner asked for cancellation.
async fn renew_lock_loop(
    manager: Arc<QueueManager>,
    job: JobRecord,
    worker_id: String,
    token: CancellationToken,
    every: Duration,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match manager.renew_lock(&job, &worker_id).await {
            Ok(LockRenewal::Renewed { cancel_requested }) => {
                if cancel_requested && !token.is_cancelled() {
                    debug!(job_id = job.id, "Cancellation observed on renewal");
                    token.cancel();
                }
            }
            Ok(LockRenewal::Lost) | Err(QueueError::NotFound(_)) => {
                warn!(job_id = job.id, worker_id = %worker_id, "Lock lost");
                token.cancel();
                return;
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Lock renewal failed");
            }
        }
    }
}
