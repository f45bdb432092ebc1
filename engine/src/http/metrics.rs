//! Metrics HTTP handlers.

use std::fmt::Write;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::queue::MetricsSnapshot;

use super::types::{ApiError, ApiResponse, ApiResult, AppState};

/// Global counters as JSON.
pub async fn get_metrics(State(qm): State<AppState>) -> ApiResult<MetricsSnapshot> {
    Ok(ApiResponse::success(qm.metrics_snapshot()))
}

/// Prometheus text exposition: lifecycle counters, per-queue gauges and worker count.
pub async fn get_prometheus_metrics(State(qm): State<AppState>) -> Result<Response, ApiError> {
    let metrics = qm.metrics_snapshot();
    let queues = qm.list_queues().await?;

    let mut output = String::with_capacity(2048);

    let counters: [(&str, &str, u64); 9] = [
        ("enqueued", "Jobs admitted", metrics.total_enqueued),
        ("claimed", "Jobs claimed by workers", metrics.total_claimed),
        ("completed", "Jobs completed", metrics.total_completed),
        ("failed", "Jobs failed terminally", metrics.total_failed),
        ("retried", "Failed attempts scheduled for retry", metrics.total_retried),
        ("stalled", "Lock expiries detected", metrics.total_stalled),
        ("cancelled", "Jobs cancelled", metrics.total_cancelled),
        ("removed", "Jobs removed by retention or delete", metrics.total_removed),
        ("quota_rejections", "Admissions rejected by quota", metrics.quota_rejections),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(output, "# HELP mediaq_jobs_{}_total {}", name, help);
        let _ = writeln!(output, "# TYPE mediaq_jobs_{}_total counter", name);
        let _ = writeln!(output, "mediaq_jobs_{}_total {}", name, value);
    }

    output.push_str("# HELP mediaq_latency_ms Average enqueue-to-completion time in milliseconds\n");
    output.push_str("# TYPE mediaq_latency_ms gauge\n");
    let _ = writeln!(output, "mediaq_latency_ms {:.2}", metrics.avg_latency_ms);

    output.push_str("# HELP mediaq_queue_jobs Jobs per queue and state\n");
    output.push_str("# TYPE mediaq_queue_jobs gauge\n");
    for q in &queues {
        // Escape for Prometheus label values
        let name = q.name.replace('\\', "\\\\").replace('"', "\\\"");
        let s = &q.stats;
        for (state, count) in [
            ("waiting", s.waiting),
            ("active", s.active),
            ("delayed", s.delayed),
            ("paused", s.paused),
            ("completed", s.completed),
            ("failed", s.failed),
            ("cancelled", s.cancelled),
        ] {
            let _ = writeln!(
                output,
                "mediaq_queue_jobs{{queue=\"{}\",state=\"{}\"}} {}",
                name, state, count
            );
        }
    }

    output.push_str("# HELP mediaq_workers_active Registered worker pools\n");
    output.push_str("# TYPE mediaq_workers_active gauge\n");
    let _ = writeln!(output, "mediaq_workers_active {}", qm.list_workers().len());

    Ok((
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    )
        .into_response())
}
