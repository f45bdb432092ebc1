//! Queue-level HTTP handlers.

use axum::extract::{Path, State};
use tracing::info;

use crate::protocol::{QueueInfo, QueueStats};

use super::types::{ApiResponse, ApiResult, AppState, UserId};

/// List every registered queue with its settings and current counts.
pub async fn list_queues(State(qm): State<AppState>) -> ApiResult<Vec<QueueInfo>> {
    let queues = qm.list_queues().await?;
    Ok(ApiResponse::success(queues))
}

/// Job counts by state.
///
/// Counts are eventually consistent. Waiting jobs of a paused queue are
/// reported under `paused`.
pub async fn get_stats(
    State(qm): State<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<QueueStats> {
    let stats = qm.get_queue_stats(&queue).await?;
    Ok(ApiResponse::success(stats))
}

/// Stop claiming from a queue. Admission keeps working.
///
/// Operator route: the caller must be identified, and deployments are
/// expected to restrict it to admin identities at the proxy.
pub async fn pause_queue(
    State(qm): State<AppState>,
    Path(queue): Path<String>,
    UserId(user): UserId,
) -> ApiResult<()> {
    qm.pause(&queue)?;
    info!(queue = %queue, user_id = %user, "Queue paused over HTTP");
    Ok(ApiResponse::success(()))
}

pub async fn resume_queue(
    State(qm): State<AppState>,
    Path(queue): Path<String>,
    UserId(user): UserId,
) -> ApiResult<()> {
    qm.resume(&queue)?;
    info!(queue = %queue, user_id = %user, "Queue resumed over HTTP");
    Ok(ApiResponse::success(()))
}
