//! Job HTTP handlers.
//!
//! Every route here is scoped to the caller named in `X-User-Id`; other
//! users' jobs answer 403 (mutations) or 404 (lookups outside the queue).

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::QueueError;
use crate::protocol::JobHandle;
use crate::queue::quota::ensure_owner;

use super::types::{
    ApiError, ApiResponse, ApiResult, AppState, ChangedResponse, EnqueueRequest, JobView,
    ListJobsQuery, UserId,
};

/// Admit a job for the caller.
pub async fn enqueue_job(
    State(qm): State<AppState>,
    Path(queue): Path<String>,
    UserId(user): UserId,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<JobHandle> {
    if let Some(owner) = req.payload.get("userId").and_then(|v| v.as_str()) {
        if owner != user {
            return Err(ApiError::UserMismatch);
        }
    }
    let handle = qm.enqueue(&queue, req.payload, req.options).await?;
    Ok(ApiResponse::success(handle))
}

/// The caller's jobs, newest first, optionally filtered by `?states=`.
pub async fn list_jobs(
    State(qm): State<AppState>,
    Path(queue): Path<String>,
    UserId(user): UserId,
    Query(params): Query<ListJobsQuery>,
) -> ApiResult<Vec<JobView>> {
    let states = params.parse_states()?;
    let jobs = qm.list_jobs(&queue, &user, &states).await?;
    Ok(ApiResponse::success(
        jobs.into_iter().map(JobView::from).collect(),
    ))
}

/// Poll one job: status, progress, error summary, result.
pub async fn get_job(
    State(qm): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    UserId(user): UserId,
) -> ApiResult<JobView> {
    let job = qm
        .get_job(&queue, id)
        .await?
        .ok_or(QueueError::NotFound(id))?;
    ensure_owner(&job, &user)?;
    Ok(ApiResponse::success(JobView::from(job)))
}

pub async fn cancel_job(
    State(qm): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    UserId(user): UserId,
) -> ApiResult<ChangedResponse> {
    let changed = qm.cancel(&queue, id, &user).await?;
    Ok(ApiResponse::success(ChangedResponse { changed }))
}

/// Requeue a failed job. Jobs in any other state answer 409.
pub async fn retry_job(
    State(qm): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    UserId(user): UserId,
) -> ApiResult<JobHandle> {
    match qm.retry(&queue, id, &user).await? {
        Some(handle) => Ok(ApiResponse::success(handle)),
        None => {
            let state = qm
                .get_job(&queue, id)
                .await?
                .map(|j| j.state)
                .ok_or(QueueError::NotFound(id))?;
            Err(QueueError::Conflict { id, state }.into())
        }
    }
}

pub async fn delete_job(
    State(qm): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    UserId(user): UserId,
) -> ApiResult<ChangedResponse> {
    let changed = qm.delete(&queue, id, &user).await?;
    Ok(ApiResponse::success(ChangedResponse { changed }))
}
