//! Cancellation and deletion.

use super::*;

#[tokio::test]
async fn test_cancel_queued_is_idempotent() {
    let (qm, _clock) = setup_manual(fast_queue("q"));
    let handle = qm.enqueue("q", payload("u1"), None).await.unwrap();

    assert!(qm.cancel("q", handle.id, "u1").await.unwrap());
    let job = qm.get_job("q", handle.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.finished_at, Some(START));

    assert!(!qm.cancel("q", handle.id, "u1").await.unwrap());
    let again = qm.get_job("q", handle.id).await.unwrap().unwrap();
    assert_eq!(again.state, JobState::Cancelled);
    assert_eq!(again.finished_at, job.finished_at);

    // No longer claimable.
    assert!(qm.claim("q", "w1").await.unwrap().is_none());
    assert_eq!(qm.metrics_snapshot().total_cancelled, 1);
}

#[tokio::test]
async fn test_cancel_delayed_removes_from_schedule() {
    let (qm, clock) = setup_manual(fast_queue("q"));
    let opts = JobOptions {
        delay_ms: Some(5_000),
        ..Default::default()
    };
    let handle = qm.enqueue("q", payload("u1"), Some(opts)).await.unwrap();
    assert!(qm.cancel("q", handle.id, "u1").await.unwrap());

    clock.advance(10_000);
    assert!(qm.claim("q", "w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_active_is_cooperative() {
    let (qm, _clock) = setup_manual(fast_queue("q"));
    let handle = qm.enqueue("q", payload("u1"), None).await.unwrap();
    let job = qm.claim("q", "w1").await.unwrap().unwrap();

    assert!(qm.cancel("q", handle.id, "u1").await.unwrap());
    // Flag only: the job keeps running until its processor reacts.
    let flagged = qm.get_job("q", handle.id).await.unwrap().unwrap();
    assert_eq!(flagged.state, JobState::Active);
    assert!(flagged.cancel_requested);
    assert!(!qm.cancel("q", handle.id, "u1").await.unwrap());

    assert_eq!(
        qm.renew_lock(&job, "w1").await.unwrap(),
        LockRenewal::Renewed {
            cancel_requested: true
        }
    );

    let cancelled = qm.finish_cancelled(&job, "w1").await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert_eq!(cancelled.lock_owner, None);
}

#[tokio::test]
async fn test_cancel_terminal_returns_false() {
    let (qm, _clock) = setup_manual(fast_queue("q"));
    let handle = qm.enqueue("q", payload("u1"), None).await.unwrap();
    let job = qm.claim("q", "w1").await.unwrap().unwrap();
    qm.complete(&job, "w1", None).await.unwrap();

    assert!(!qm.cancel("q", handle.id, "u1").await.unwrap());
    let job = qm.get_job("q", handle.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn test_delete_active_conflicts() {
    let (qm, _clock) = setup_manual(fast_queue("q"));
    let handle = qm.enqueue("q", payload("u1"), None).await.unwrap();
    let job = qm.claim("q", "w1").await.unwrap().unwrap();

    let err = qm.delete("q", handle.id, "u1").await.unwrap_err();
    assert_eq!(
        err,
        QueueError::Conflict {
            id: handle.id,
            state: JobState::Active
        }
    );
    assert_eq!(err.code(), "conflict");

    qm.complete(&job, "w1", None).await.unwrap();
    assert!(qm.delete("q", handle.id, "u1").await.unwrap());
    assert!(qm.get_job("q", handle.id).await.unwrap().is_none());
    assert_eq!(
        qm.delete("q", handle.id, "u1").await.unwrap_err(),
        QueueError::NotFound(handle.id)
    );
}
