//! Input validation for queue names and payloads.

use serde_json::Value;

use crate::config::PayloadSchema;
use crate::error::{QueueError, Result};
use crate::protocol::{DownloadPayload, JobOptions};

pub const MAX_QUEUE_NAME_LENGTH: usize = 256;
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576; // 1MB
pub const MAX_JOB_ATTEMPTS: u32 = 1_000;
/// Upper bound for any per-job delay (30 days).
pub const MAX_JOB_DELAY_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Queue names: alphanumeric plus `-`, `_`, `.` and `:`.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(QueueError::Validation("Queue name cannot be empty".into()));
    }
    if name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(QueueError::Validation(format!(
            "Queue name too long (max {} chars)",
            MAX_QUEUE_NAME_LENGTH
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(QueueError::Validation(
            "Queue name must be alphanumeric, dash, underscore, dot or colon".into(),
        ));
    }
    Ok(())
}

/// Check the payload against the queue's schema and return its owner.
pub fn validate_payload(schema: PayloadSchema, payload: &Value) -> Result<String> {
    let Some(object) = payload.as_object() else {
        return Err(QueueError::Validation("payload must be a JSON object".into()));
    };

    let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(0);
    if size > MAX_PAYLOAD_SIZE {
        return Err(QueueError::Validation(format!(
            "payload too large ({} bytes, max {})",
            size, MAX_PAYLOAD_SIZE
        )));
    }

    let user_id = match object.get("userId") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => return Err(QueueError::Validation("payload.userId is required".into())),
    };

    if schema == PayloadSchema::Download {
        let download: DownloadPayload = serde_json::from_value(payload.clone())
            .map_err(|e| QueueError::Validation(format!("invalid download payload: {}", e)))?;
        let url = download.source_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(QueueError::Validation(
                "payload.sourceUrl must be an http(s) URL".into(),
            ));
        }
        if download.request_id.trim().is_empty() {
            return Err(QueueError::Validation("payload.requestId is required".into()));
        }
    }

    Ok(user_id)
}

/// Bound the per-job overrides a caller may submit.
pub fn validate_options(options: &JobOptions) -> Result<()> {
    if let Some(n) = options.max_attempts {
        if n == 0 || n > MAX_JOB_ATTEMPTS {
            return Err(QueueError::Validation(format!(
                "maxAttempts must be between 1 and {}",
                MAX_JOB_ATTEMPTS
            )));
        }
    }
    for (field, value) in [
        ("delayMs", options.delay_ms),
        ("baseDelayMs", options.base_delay_ms),
        ("backoffCeilingMs", options.backoff_ceiling_ms),
    ] {
        if value.is_some_and(|v| v > MAX_JOB_DELAY_MS) {
            return Err(QueueError::Validation(format!(
                "{} must not exceed {} ms",
                field, MAX_JOB_DELAY_MS
            )));
        }
    }
    if let (Some(base), Some(ceiling)) = (options.base_delay_ms, options.backoff_ceiling_ms) {
        if base > ceiling {
            return Err(QueueError::Validation(
                "baseDelayMs must not exceed backoffCeilingMs".into(),
            ));
        }
    }
    Ok(())
}
