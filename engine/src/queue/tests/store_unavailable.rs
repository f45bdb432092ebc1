//! Behaviour while the store is unreachable.

use async_trait::async_trait;

use super::*;
use crate::error::StoreError;
use crate::protocol::Progress;
use crate::queue::store::{CancelOutcome, StateCounts, StoreResult};

/// MemoryStore that can be switched off.
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    reject_inserts: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            down: AtomicBool::new(false),
            reject_inserts: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn set_reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn next_id(&self) -> StoreResult<u64> {
        self.check()?;
        self.inner.next_id().await
    }

    async fn insert(&self, job: JobRecord) -> StoreResult<()> {
        self.check()?;
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.insert(job).await
    }

    async fn get(&self, id: u64) -> StoreResult<Option<JobRecord>> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn list_by_state(&self, queue: &str, state: JobState) -> StoreResult<Vec<JobRecord>> {
        self.check()?;
        self.inner.list_by_state(queue, state).await
    }

    async fn list_by_user(&self, queue: &str, user_id: &str) -> StoreResult<Vec<JobRecord>> {
        self.check()?;
        self.inner.list_by_user(queue, user_id).await
    }

    async fn counts(&self, queue: &str) -> StoreResult<StateCounts> {
        self.check()?;
        self.inner.counts(queue).await
    }

    async fn claim_next(
        &self,
        queue: &str,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<Option<JobRecord>> {
        self.check()?;
        self.inner
            .claim_next(queue, worker_id, now, lock_duration)
            .await
    }

    async fn renew_lock(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        lock_duration: u64,
    ) -> StoreResult<LockRenewal> {
        self.check()?;
        self.inner.renew_lock(id, worker_id, now, lock_duration).await
    }

    async fn update_progress(
        &self,
        id: u64,
        worker_id: &str,
        progress: Progress,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.update_progress(id, worker_id, progress).await
    }

    async fn complete(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        result: Option<Value>,
    ) -> StoreResult<JobRecord> {
        self.check()?;
        self.inner.complete(id, worker_id, now, result).await
    }

    async fn fail(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
        error: &str,
        retry_delay: Option<u64>,
    ) -> StoreResult<JobRecord> {
        self.check()?;
        self.inner.fail(id, worker_id, now, error, retry_delay).await
    }

    async fn finish_cancelled(
        &self,
        id: u64,
        worker_id: &str,
        now: u64,
    ) -> StoreResult<JobRecord> {
        self.check()?;
        self.inner.finish_cancelled(id, worker_id, now).await
    }

    async fn cancel(&self, id: u64, now: u64) -> StoreResult<CancelOutcome> {
        self.check()?;
        self.inner.cancel(id, now).await
    }

    async fn requeue(
        &self,
        id: u64,
        now: u64,
        max_attempts: u32,
    ) -> StoreResult<Option<JobRecord>> {
        self.check()?;
        self.inner.requeue(id, now, max_attempts).await
    }

    async fn recover_stalled(
        &self,
        queue: &str,
        now: u64,
        max_stalled_count: u32,
    ) -> StoreResult<Vec<StallRecovery>> {
        self.check()?;
        self.inner.recover_stalled(queue, now, max_stalled_count).await
    }

    async fn remove(&self, id: u64) -> StoreResult<Option<JobRecord>> {
        self.check()?;
        self.inner.remove(id).await
    }

    async fn remove_if_state(&self, id: u64, state: JobState) -> StoreResult<bool> {
        self.check()?;
        self.inner.remove_if_state(id, state).await
    }

    async fn put_ephemeral(
        &self,
        key: &str,
        value: Value,
        now: u64,
        ttl_ms: u64,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.put_ephemeral(key, value, now, ttl_ms).await
    }

    async fn get_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>> {
        self.check()?;
        self.inner.get_ephemeral(key, now).await
    }

    async fn take_ephemeral(&self, key: &str, now: u64) -> StoreResult<Option<Value>> {
        self.check()?;
        self.inner.take_ephemeral(key, now).await
    }

    async fn purge_ephemeral(&self, now: u64) -> StoreResult<usize> {
        self.check()?;
        self.inner.purge_ephemeral(now).await
    }
}

fn flaky_setup() -> (Arc<QueueManager>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let quota = Arc::new(MemoryStore::new());
    let qm = QueueManager::with_clock(store.clone(), quota, Arc::new(SystemClock));
    qm.register_queue(fast_queue(TEST_QUEUE)).unwrap();
    (qm, store)
}

#[tokio::test]
async fn test_admission_fails_fast() {
    let (qm, store) = flaky_setup();
    store.set_down(true);

    let err = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap_err();
    assert!(matches!(err, QueueError::StoreUnavailable(_)));
    assert_eq!(err.code(), "store_unavailable");
    assert!(err.is_transient());

    store.set_down(false);
    assert_eq!(qm.get_queue_stats(TEST_QUEUE).await.unwrap().total, 0);
}

fn flaky_quota_setup(limit: u32) -> (Arc<QueueManager>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let quota = Arc::new(MemoryStore::new());
    let qm = QueueManager::with_clock(store.clone(), quota, Arc::new(SystemClock));
    qm.register_queue(fast_queue(TEST_QUEUE).quota(limit, HOUR))
        .unwrap();
    (qm, store)
}

#[tokio::test]
async fn test_outage_does_not_consume_quota() {
    let (qm, store) = flaky_quota_setup(2);
    store.set_down(true);
    for _ in 0..2 {
        let err = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
    }

    store.set_down(false);
    assert_eq!(qm.get_queue_stats(TEST_QUEUE).await.unwrap().total, 0);
    qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    let err = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap_err();
    assert!(matches!(err, QueueError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn test_failed_insert_releases_quota() {
    let (qm, store) = flaky_quota_setup(1);
    store.set_reject_inserts(true);
    let err = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap_err();
    assert_eq!(err.code(), "store_unavailable");

    store.set_reject_inserts(false);
    let handle = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    assert!(qm.get_job(TEST_QUEUE, handle.id).await.unwrap().is_some());
    assert!(qm.enqueue(TEST_QUEUE, payload("u1"), None).await.is_err());
}

#[tokio::test]
async fn test_claim_loop_recovers_after_outage() {
    let (qm, store) = flaky_setup();
    let handle = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();

    store.set_down(true);
    qm.register_processor(TEST_QUEUE, 1, |_ctx: JobContext| async move {
        Ok::<_, QueueError>(json!("done"))
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(qm.metrics_snapshot().total_claimed, 0);

    store.set_down(false);
    let job = wait_for_state(&qm, TEST_QUEUE, handle.id, JobState::Completed).await;
    assert_eq!(job.result, Some(json!("done")));
}
