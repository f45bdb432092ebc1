//! Core QueueManager struct and constructors.
//!
//! The manager is the queue registry: an explicit value created by the
//! composition root and shared by handle with the HTTP layer and the worker
//! pools. All authoritative state lives in the store; the manager only keeps
//! per-process wake-ups, worker tasks and local cancellation tokens.

use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compact_str::CompactString;
use dashmap::DashMap;
use gxhash::GxHasher;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::quota::{QuotaGuard, QuotaStore};
use super::store::Store;
use super::types::{Clock, GlobalMetrics, GxHashMap, SystemClock};
use super::validation::validate_queue_name;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::protocol::{JobEvent, JobEventKind, JobRecord, WorkerInfo};

/// Cancellation tokens of jobs running in this process: job id -> (slot id, token).
pub type JobTokenMap = DashMap<u64, (String, CancellationToken), BuildHasherDefault<GxHasher>>;

/// Registration entry for one queue.
pub struct QueueEntry {
    pub config: QueueConfig,
    pub(crate) notify: Arc<Notify>,
    pub(crate) paused: AtomicBool,
    pub(crate) next_stall_check: AtomicU64,
    pub(crate) next_sweep: AtomicU64,
}

impl QueueEntry {
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

pub struct QueueManager {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) quota: QuotaGuard,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) queues: RwLock<GxHashMap<CompactString, Arc<QueueEntry>>>,
    pub(crate) job_tokens: JobTokenMap,
    pub(crate) metrics: GlobalMetrics,
    pub(crate) event_tx: broadcast::Sender<JobEvent>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) worker_tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) workers: RwLock<GxHashMap<String, WorkerInfo>>,
}

/// The registry handle passed to admission and worker components.
pub type QueueRegistry = QueueManager;

impl QueueManager {
    /// Registry over a store that also keeps quota counters, on the system clock.
    pub fn new<S>(store: Arc<S>) -> Arc<Self>
    where
        S: Store + QuotaStore + 'static,
    {
        let quota: Arc<dyn QuotaStore> = store.clone();
        Self::with_clock(store, quota, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        quota: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(1024);
        info!(store = store.name(), "Queue registry created");
        Arc::new(Self {
            store,
            quota: QuotaGuard::new(quota),
            clock,
            queues: RwLock::new(GxHashMap::default()),
            job_tokens: DashMap::with_capacity_and_hasher(64, Default::default()),
            metrics: GlobalMetrics::new(),
            event_tx,
            shutdown: CancellationToken::new(),
            worker_tasks: Mutex::new(Vec::new()),
            workers: RwLock::new(GxHashMap::default()),
        })
    }

    // ============== Registry ==============

    pub fn register_queue(&self, config: QueueConfig) -> Result<()> {
        validate_queue_name(&config.name)?;
        config.validate()?;

        let now = self.now_ms();
        let mut queues = self.queues.write();
        if queues.contains_key(&config.name) {
            return Err(QueueError::Validation(format!(
                "queue {} is already registered",
                config.name
            )));
        }
        info!(
            queue = %config.name,
            concurrency = config.concurrency,
            quota = ?config.quota.map(|q| q.limit),
            "Queue registered"
        );
        let entry = QueueEntry {
            next_stall_check: AtomicU64::new(now.saturating_add(config.stalled_check_interval_ms)),
            next_sweep: AtomicU64::new(now.saturating_add(config.retention.sweep_interval_ms)),
            notify: Arc::new(Notify::new()),
            paused: AtomicBool::new(false),
            config,
        };
        queues.insert(entry.config.name.clone(), Arc::new(entry));
        Ok(())
    }

    pub(crate) fn queue(&self, name: &str) -> Result<Arc<QueueEntry>> {
        self.queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(name.to_string()))
    }

    pub fn queue_config(&self, name: &str) -> Option<QueueConfig> {
        self.queues.read().get(name).map(|q| q.config.clone())
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    pub(crate) fn queue_entries(&self) -> Vec<Arc<QueueEntry>> {
        self.queues.read().values().cloned().collect()
    }

    /// Resolve a job by id and check it belongs to `queue`.
    pub(crate) async fn job_in_queue(&self, queue: &str, id: u64) -> Result<Option<JobRecord>> {
        Ok(self
            .store
            .get(id)
            .await?
            .filter(|job| job.queue_name == queue))
    }

    // ============== Time & events ==============

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, kind: JobEventKind, job: &JobRecord, error: Option<String>) {
        if self.event_tx.receiver_count() == 0 {
            return;
        }
        let progress = (kind == JobEventKind::Progress).then_some(job.progress.percent);
        let _ = self.event_tx.send(JobEvent {
            kind,
            queue: job.queue_name.to_string(),
            job_id: job.id,
            timestamp: self.now_ms(),
            progress,
            error,
        });
    }

    pub(crate) fn notify_queue(&self, entry: &QueueEntry) {
        entry.notify.notify_waiters();
    }

    // ============== Shutdown ==============

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop claiming new work. Running handlers finish on their own.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Queue registry shutting down");
        self.shutdown.cancel();
        for entry in self.queue_entries() {
            self.notify_queue(&entry);
        }
    }

    /// Wait for every worker task to exit. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_tasks.lock());
        let count = tasks.len();
        let joined = tokio::time::timeout(timeout, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        match joined {
            Ok(()) => {
                info!(workers = count, "Worker tasks drained");
                true
            }
            Err(_) => {
                warn!(workers = count, timeout_ms = timeout.as_millis() as u64, "Drain timed out");
                false
            }
        }
    }
}
