//! Lifecycle transitions: completion, retry backoff, terminal failure, manual retry.

use super::*;

fn backoff_queue() -> QueueConfig {
    QueueConfig::new("media")
        .retry(4, 5_000, 60_000)
        .lock(30_000, 15_000)
}

#[tokio::test]
async fn test_complete_releases_lock() {
    let (qm, clock) = setup_manual(backoff_queue());
    let handle = qm.enqueue("media", payload("u1"), None).await.unwrap();
    let job = qm.claim("media", "w1").await.unwrap().unwrap();
    assert_eq!(job.processed_at, Some(START));
    assert_eq!(job.lock_owner.as_deref(), Some("w1"));

    clock.advance(250);
    let done = qm
        .complete(&job, "w1", Some(json!({"file": "clip.mp4"})))
        .await
        .unwrap();
    assert_eq!(done.id, handle.id);
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.finished_at, Some(START + 250));
    assert_eq!(done.lock_owner, None);
    assert_eq!(done.progress.percent, 100);
    assert_eq!(done.result, Some(json!({"file": "clip.mp4"})));
    assert_eq!(qm.metrics_snapshot().total_completed, 1);
}

#[tokio::test]
async fn test_backoff_delays_are_exact() {
    let (qm, clock) = setup_manual(backoff_queue());
    let handle = qm.enqueue("media", payload("u1"), None).await.unwrap();

    let mut expected_delays = Vec::new();
    for _ in 0..3 {
        let job = qm.claim("media", "w1").await.unwrap().unwrap();
        let failed = qm.fail(&job, "w1", "connection reset").await.unwrap();
        assert_eq!(failed.state, JobState::Delayed);
        assert!(failed.attempts_made <= failed.max_attempts);
        let delay = failed.run_at - clock.now_ms();
        expected_delays.push(delay);

        // Not claimable until the delay has elapsed.
        clock.advance(delay - 1);
        assert!(qm.claim("media", "w1").await.unwrap().is_none());
        clock.advance(1);
    }
    assert_eq!(expected_delays, vec![5_000, 10_000, 20_000]);

    let job = qm.claim("media", "w1").await.unwrap().unwrap();
    let failed = qm.fail(&job, "w1", "connection reset").await.unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts_made, 4);
    assert_eq!(failed.max_attempts, 4);
    assert_eq!(failed.last_error.as_deref(), Some("connection reset"));

    let stored = qm.get_job("media", handle.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    let snapshot = qm.metrics_snapshot();
    assert_eq!(snapshot.total_retried, 3);
    assert_eq!(snapshot.total_failed, 1);
}

#[tokio::test]
async fn test_backoff_capped_at_ceiling() {
    let (qm, clock) = setup_manual(
        QueueConfig::new("media")
            .retry(5, 5_000, 8_000)
            .lock(30_000, 15_000),
    );
    qm.enqueue("media", payload("u1"), None).await.unwrap();

    let mut delays = Vec::new();
    for _ in 0..3 {
        let job = qm.claim("media", "w1").await.unwrap().unwrap();
        let failed = qm.fail(&job, "w1", "boom").await.unwrap();
        let delay = failed.run_at - clock.now_ms();
        delays.push(delay);
        clock.advance(delay);
    }
    assert_eq!(delays, vec![5_000, 8_000, 8_000]);
}

#[tokio::test]
async fn test_single_attempt_fails_immediately() {
    let (qm, _clock) = setup_manual(backoff_queue());
    let opts = JobOptions {
        max_attempts: Some(1),
        ..Default::default()
    };
    qm.enqueue("media", payload("u1"), Some(opts)).await.unwrap();
    let job = qm.claim("media", "w1").await.unwrap().unwrap();
    let failed = qm.fail(&job, "w1", "fatal:\n  stack line").await.unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts_made, 1);
    assert_eq!(failed.last_error.as_deref(), Some("fatal: stack line"));
}

#[tokio::test]
async fn test_manual_retry_preserves_attempts() {
    let (qm, _clock) = setup_manual(backoff_queue());
    let opts = JobOptions {
        max_attempts: Some(1),
        ..Default::default()
    };
    let handle = qm.enqueue("media", payload("u1"), Some(opts)).await.unwrap();
    let job = qm.claim("media", "w1").await.unwrap().unwrap();
    qm.fail(&job, "w1", "fatal").await.unwrap();

    let retried = qm.retry("media", handle.id, "u1").await.unwrap().unwrap();
    assert_eq!(retried.id, handle.id);
    assert_eq!(retried.state, JobState::Queued);

    let job = qm.get_job("media", handle.id).await.unwrap().unwrap();
    assert_eq!(job.attempts_made, 1);
    assert_eq!(job.max_attempts, 1 + 4);
    assert_eq!(job.manual_retries, 1);
    assert_eq!(job.last_error, None);
    assert_eq!(job.finished_at, None);

    let again = qm.claim("media", "w2").await.unwrap().unwrap();
    assert_eq!(again.id, handle.id);
}

#[tokio::test]
async fn test_retry_only_from_failed() {
    let (qm, _clock) = setup_manual(backoff_queue());
    let handle = qm.enqueue("media", payload("u1"), None).await.unwrap();
    assert!(qm.retry("media", handle.id, "u1").await.unwrap().is_none());

    let job = qm.claim("media", "w1").await.unwrap().unwrap();
    qm.complete(&job, "w1", None).await.unwrap();
    assert!(qm.retry("media", handle.id, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_requires_lock() {
    let (qm, _clock) = setup_manual(backoff_queue());
    let handle = qm.enqueue("media", payload("u1"), None).await.unwrap();
    let job = qm.claim("media", "w1").await.unwrap().unwrap();

    let meta = ProgressMeta {
        status: Some("downloading".into()),
        current_item: Some("part-2".into()),
        total_items: Some(4),
        completed_items: Some(1),
    };
    qm.update_progress(&job, "w1", 40, meta.clone()).await.unwrap();
    let stored = qm.get_job("media", handle.id).await.unwrap().unwrap();
    assert_eq!(stored.progress.percent, 40);
    assert_eq!(stored.progress.status.as_deref(), Some("downloading"));
    assert_eq!(stored.progress.total_items, Some(4));

    let err = qm.update_progress(&job, "w2", 50, meta).await.unwrap_err();
    assert_eq!(err, QueueError::LockLost(handle.id));
}
