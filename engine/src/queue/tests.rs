//! Queue engine tests.
//!
//! Shared helpers live here; each submodule covers one area.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::*;
use crate::config::{QueueConfig, RetentionPolicy, RetentionRule};
use crate::error::QueueError;
use crate::protocol::{JobEventKind, JobOptions, JobRecord, JobState, ProgressMeta};

mod admission;
mod cancel;
mod lifecycle;
mod store_unavailable;

const HOUR: u64 = 3_600_000;
const START: u64 = 1_700_000_000_000;
const TEST_QUEUE: &str = "test";

/// Registry on the system clock with a generic queue tuned for fast tests.
fn setup() -> Arc<QueueManager> {
    let qm = QueueManager::new(Arc::new(MemoryStore::new()));
    qm.register_queue(fast_queue(TEST_QUEUE)).unwrap();
    qm
}

fn fast_queue(name: &str) -> QueueConfig {
    QueueConfig::new(name)
        .concurrency(2)
        .retry(3, 20, 200)
        .lock(300, 100)
        .stalled(100, 1)
        .poll_interval(20)
}

/// Registry on a manual clock with `config` registered.
fn setup_manual(config: QueueConfig) -> (Arc<QueueManager>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START));
    let qm = QueueManager::with_clock(store.clone(), store, clock.clone());
    qm.register_queue(config).unwrap();
    (qm, clock)
}

fn download_payload(user: &str) -> Value {
    json!({
        "userId": user,
        "sourceUrl": "https://media.example.com/watch/abc",
        "title": "Example clip",
        "requestId": format!("req-{}", user),
        "options": {"quality": "1080p", "format": "mp4", "subtitles": false}
    })
}

fn payload(user: &str) -> Value {
    json!({"userId": user, "item": 1})
}

async fn wait_for_state(qm: &QueueManager, queue: &str, id: u64, state: JobState) -> JobRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = qm.get_job(queue, id).await.unwrap() {
            if job.state == state {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never reached {}",
            id,
            state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
