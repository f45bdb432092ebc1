//! Health check handler.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, response::Json};

use super::types::{ApiResponse, AppState, HealthResponse};

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub(crate) fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Always 200 while the HTTP server is responsive.
pub async fn health_check(State(qm): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let uptime_ms = START_TIME
        .get()
        .map(|t| t.elapsed().as_millis() as u64)
        .unwrap_or(0);

    ApiResponse::success(HealthResponse {
        status: if qm.is_shutdown() { "draining" } else { "healthy" },
        uptime_ms,
        store: qm.store_name(),
        shutting_down: qm.is_shutdown(),
    })
}
