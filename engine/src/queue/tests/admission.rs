//! Admission, queries, queue control and sessions.

use super::*;

#[tokio::test]
async fn test_enqueue_then_get_is_queued() {
    let qm = setup();
    let handle = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    assert_eq!(handle.state, JobState::Queued);
    assert_eq!(handle.queue, TEST_QUEUE);

    let job = qm.get_job(TEST_QUEUE, handle.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.attempts_made, 0);
    assert_eq!(job.user_id, "u1");
    assert_eq!(job.max_attempts, 3);
}

#[tokio::test]
async fn test_download_queue_round_trip() {
    let (qm, _clock) = setup_manual(QueueConfig::download());
    let handle = qm
        .enqueue("downloads", download_payload("alice"), None)
        .await
        .unwrap();
    let job = qm.get_job("downloads", handle.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.payload["sourceUrl"], "https://media.example.com/watch/abc");
    assert_eq!(job.backoff.base_delay_ms, 5000);
}

#[tokio::test]
async fn test_unknown_queue_rejected() {
    let qm = setup();
    let err = qm.enqueue("nope", payload("u1"), None).await.unwrap_err();
    assert!(matches!(err, QueueError::UnknownQueue(_)));
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_invalid_payload_creates_no_record() {
    let (qm, _clock) = setup_manual(QueueConfig::download());
    let bad = json!({"userId": "u1", "sourceUrl": "not-a-url", "requestId": "r"});
    let err = qm.enqueue("downloads", bad, None).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));

    let stats = qm.get_queue_stats("downloads").await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(qm.metrics_snapshot().total_enqueued, 0);
}

#[tokio::test]
async fn test_delayed_option() {
    let (qm, clock) = setup_manual(fast_queue("q"));
    let opts = JobOptions {
        delay_ms: Some(1000),
        ..Default::default()
    };
    let handle = qm.enqueue("q", payload("u1"), Some(opts)).await.unwrap();
    assert_eq!(handle.state, JobState::Delayed);

    assert!(qm.claim("q", "w1").await.unwrap().is_none());
    clock.advance(1000);
    let job = qm.claim("q", "w1").await.unwrap().unwrap();
    assert_eq!(job.id, handle.id);
    assert_eq!(job.state, JobState::Active);
    assert_eq!(job.lock_expires_at, Some(START + 1000 + 300));
}

#[tokio::test]
async fn test_options_reject_inverted_backoff() {
    let qm = setup();
    let opts = JobOptions {
        base_delay_ms: Some(10_000),
        backoff_ceiling_ms: Some(1_000),
        ..Default::default()
    };
    let err = qm.enqueue(TEST_QUEUE, payload("u1"), Some(opts)).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
async fn test_options_reject_unbounded_delays() {
    let qm = setup();
    let huge_delay = JobOptions {
        delay_ms: Some(u64::MAX),
        ..Default::default()
    };
    let err = qm
        .enqueue(TEST_QUEUE, payload("u1"), Some(huge_delay))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));

    let huge_backoff = JobOptions {
        base_delay_ms: Some(u64::MAX),
        backoff_ceiling_ms: Some(u64::MAX),
        ..Default::default()
    };
    let err = qm
        .enqueue(TEST_QUEUE, payload("u1"), Some(huge_backoff))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
    assert_eq!(qm.get_queue_stats(TEST_QUEUE).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_get_job_scoped_to_queue() {
    let qm = setup();
    qm.register_queue(fast_queue("other")).unwrap();
    let handle = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    assert!(qm.get_job("other", handle.id).await.unwrap().is_none());
    assert!(qm.get_job(TEST_QUEUE, 999_999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_jobs_filters_owner_and_state() {
    let (qm, clock) = setup_manual(fast_queue("q"));
    let a = qm.enqueue("q", payload("u1"), None).await.unwrap();
    clock.advance(1);
    let b = qm.enqueue("q", payload("u1"), None).await.unwrap();
    clock.advance(1);
    qm.enqueue("q", payload("u2"), None).await.unwrap();

    let claimed = qm.claim("q", "w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, a.id);

    let all = qm.list_jobs("q", "u1", &[]).await.unwrap();
    assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);

    let queued = qm.list_jobs("q", "u1", &[JobState::Queued]).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, b.id);

    let active = qm.list_by_state("q", JobState::Active).await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let qm = setup();
    assert!(matches!(
        qm.register_queue(fast_queue(TEST_QUEUE)),
        Err(QueueError::Validation(_))
    ));
    assert!(qm
        .register_queue(QueueConfig::new("bad").lock(100, 200))
        .is_err());
    assert_eq!(qm.queue_names(), vec![TEST_QUEUE.to_string()]);
}

#[tokio::test]
async fn test_pause_blocks_claims_and_reports_paused() {
    let (qm, _clock) = setup_manual(fast_queue("q"));
    qm.enqueue("q", payload("u1"), None).await.unwrap();
    qm.pause("q").unwrap();

    assert!(qm.claim("q", "w1").await.unwrap().is_none());
    let stats = qm.get_queue_stats("q").await.unwrap();
    assert_eq!(stats.paused, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.total, 1);

    qm.resume("q").unwrap();
    assert!(!qm.is_paused("q").unwrap());
    assert!(qm.claim("q", "w1").await.unwrap().is_some());
    let stats = qm.get_queue_stats("q").await.unwrap();
    assert_eq!(stats.active, 1);
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let qm = setup();
    let mut rx = qm.subscribe();
    let handle = qm.enqueue(TEST_QUEUE, payload("u1"), None).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, JobEventKind::Enqueued);
    assert_eq!(event.job_id, handle.id);
    assert_eq!(event.queue, TEST_QUEUE);
}

#[tokio::test]
async fn test_sessions_expire_with_ttl() {
    let (qm, clock) = setup_manual(fast_queue("q"));
    qm.put_session("pin:4821", json!({"userId": "u1"}), 60_000)
        .await
        .unwrap();
    assert_eq!(
        qm.get_session("pin:4821").await.unwrap(),
        Some(json!({"userId": "u1"}))
    );

    clock.advance(60_000);
    assert!(qm.get_session("pin:4821").await.unwrap().is_none());

    qm.put_session("pin:1", json!(1), 1000).await.unwrap();
    assert_eq!(qm.take_session("pin:1").await.unwrap(), Some(json!(1)));
    assert!(qm.take_session("pin:1").await.unwrap().is_none());
}
