//! HTTP API request and response types.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::QueueError;
use crate::protocol::{JobOptions, JobRecord, JobState, Progress};
use crate::queue::QueueManager;

/// Shared application state.
pub type AppState = Arc<QueueManager>;

/// Header carrying the authenticated caller. Authentication itself happens upstream.
pub const USER_HEADER: &str = "x-user-id";

/// Enqueue request.
#[derive(Deserialize)]
pub struct EnqueueRequest {
    pub payload: Value,
    #[serde(default)]
    pub options: Option<JobOptions>,
}

/// Job list query parameters.
#[derive(Deserialize)]
pub struct ListJobsQuery {
    /// Comma-separated states; empty or absent means every state.
    #[serde(default)]
    pub states: Option<String>,
}

impl ListJobsQuery {
    pub fn parse_states(&self) -> Result<Vec<JobState>, ApiError> {
        let Some(raw) = self.states.as_deref() else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                JobState::from_str(s).ok_or_else(|| {
                    ApiError::Queue(QueueError::Validation(format!("unknown state: {}", s)))
                })
            })
            .collect()
    }
}

/// Generic API response wrapper.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Error side of every handler.
#[derive(Debug)]
pub enum ApiError {
    Queue(QueueError),
    /// No `X-User-Id` header on a user-scoped route.
    MissingUser,
    /// `payload.userId` names someone other than the caller.
    UserMismatch,
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Queue(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUser => StatusCode::UNAUTHORIZED,
            ApiError::UserMismatch => StatusCode::FORBIDDEN,
            ApiError::Queue(e) => match e {
                QueueError::Validation(_) => StatusCode::BAD_REQUEST,
                QueueError::UnknownQueue(_) | QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                QueueError::Forbidden(_) => StatusCode::FORBIDDEN,
                QueueError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                QueueError::Conflict { .. } | QueueError::LockLost(_) => StatusCode::CONFLICT,
                QueueError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                QueueError::Processing(_) | QueueError::Stalled(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::MissingUser => "unauthorized",
            ApiError::UserMismatch => "forbidden",
            ApiError::Queue(e) => e.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingUser => "missing X-User-Id header".to_string(),
            ApiError::UserMismatch => "payload.userId does not match the caller".to_string(),
            ApiError::Queue(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiResponse::<()> {
            ok: false,
            data: None,
            error: Some(self.message()),
            code: Some(self.code()),
        });
        let mut response = (status, body).into_response();

        if let ApiError::Queue(QueueError::QuotaExceeded { retry_after_ms, .. }) = &self {
            let wait_secs = retry_after_ms.div_ceil(1000);
            if let Ok(value) = HeaderValue::from_str(&wait_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Caller identity taken from the `X-User-Id` header.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UserId(s.to_string()))
            .ok_or(ApiError::MissingUser)
    }
}

/// Job as seen by its owner while polling.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: u64,
    pub queue: String,
    pub status: JobState,
    pub progress: Progress,
    pub payload: Value,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    /// Next attempt time for delayed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub cancel_requested: bool,
    pub manual_retries: u32,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        let next_attempt_at = (job.state == JobState::Delayed).then_some(job.run_at);
        Self {
            id: job.id,
            queue: job.queue_name.to_string(),
            status: job.state,
            progress: job.progress,
            payload: job.payload,
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            processed_at: job.processed_at,
            finished_at: job.finished_at,
            next_attempt_at,
            error: job.last_error,
            result: job.result,
            cancel_requested: job.cancel_requested,
            manual_retries: job.manual_retries,
        }
    }
}

/// Result of cancel / delete.
#[derive(Serialize)]
pub struct ChangedResponse {
    pub changed: bool,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u64,
    pub store: &'static str,
    pub shutting_down: bool,
}
