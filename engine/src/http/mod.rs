//! HTTP API module.
//!
//! Admission, polling and owner operations for jobs, queue stats and
//! control, health and Prometheus metrics. The caller's identity arrives
//! in the `X-User-Id` header, set by the authenticating proxy in front.

mod health;
mod jobs;
mod metrics;
mod queues;
mod types;

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use types::{ApiError, ApiResponse, AppState, JobView, USER_HEADER};

/// Create CORS layer based on environment configuration.
/// Set CORS_ALLOW_ORIGIN env var for production (comma-separated list of origins).
/// If not set, allows all origins (development mode).
fn create_cors_layer() -> CorsLayer {
    match std::env::var("CORS_ALLOW_ORIGIN").ok() {
        Some(origins) if !origins.is_empty() && origins != "*" => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static(USER_HEADER),
                ])
        }
        _ => CorsLayer::permissive(),
    }
}

/// Create the HTTP router with all API routes.
pub fn create_router(state: AppState) -> Router {
    health::init_start_time();

    Router::new()
        // Queues
        .route("/queues", get(queues::list_queues))
        .route("/queues/{queue}/stats", get(queues::get_stats))
        .route("/queues/{queue}/pause", post(queues::pause_queue))
        .route("/queues/{queue}/resume", post(queues::resume_queue))
        // Jobs
        .route(
            "/queues/{queue}/jobs",
            post(jobs::enqueue_job).get(jobs::list_jobs),
        )
        .route(
            "/queues/{queue}/jobs/{id}",
            get(jobs::get_job).delete(jobs::delete_job),
        )
        .route("/queues/{queue}/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/queues/{queue}/jobs/{id}/retry", post(jobs::retry_job))
        // Metrics
        .route("/metrics", get(metrics::get_metrics))
        .route("/metrics/prometheus", get(metrics::get_prometheus_metrics))
        // Health
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
}
