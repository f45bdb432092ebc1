//! Error taxonomy for admission, processing and store access.

use thiserror::Error;

use crate::protocol::JobState;

/// Errors surfaced by the queue engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Bad payload or options. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Admission rejected by the per-user quota. No record was created.
    #[error("Quota exceeded: limit {limit} reached, resets at {reset_at}")]
    QuotaExceeded {
        limit: u32,
        remaining: u32,
        reset_at: u64,
        /// Time left in the window, measured on the registry's clock.
        retry_after_ms: u64,
    },

    /// Ownership mismatch on a mutating call.
    #[error("Forbidden: job {0} belongs to another user")]
    Forbidden(u64),

    #[error("Job not found: {0}")]
    NotFound(u64),

    /// The mutation is not legal in the job's current state.
    #[error("Conflict: job {id} is {state}")]
    Conflict { id: u64, state: JobState },

    /// Processor returned an error.
    #[error("Processing error: {0}")]
    Processing(String),

    /// Lock expired without renewal.
    #[error("Stall error: {0}")]
    Stalled(String),

    /// The worker no longer owns the job.
    #[error("Lock lost for job {0}")]
    LockLost(u64),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl QueueError {
    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::Validation(_) | QueueError::UnknownQueue(_) => "validation_error",
            QueueError::QuotaExceeded { .. } => "quota_exceeded",
            QueueError::Forbidden(_) => "forbidden",
            QueueError::NotFound(_) => "not_found",
            QueueError::Conflict { .. } => "conflict",
            QueueError::Processing(_) => "processing_error",
            QueueError::Stalled(_) => "stall_error",
            QueueError::LockLost(_) => "lock_lost",
            QueueError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Whether a claim loop should back off and try again.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable(_))
    }
}

/// Errors returned by the durable store contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("job {0} not found")]
    NotFound(u64),

    #[error("job {0} is locked by another worker")]
    LockMismatch(u64),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => QueueError::StoreUnavailable(msg),
            StoreError::NotFound(id) => QueueError::NotFound(id),
            StoreError::LockMismatch(id) => QueueError::LockLost(id),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
