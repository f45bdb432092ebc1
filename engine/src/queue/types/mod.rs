//! Type definitions for the mediaq queue engine.
//!
//! Module organization:
//! - `time.rs` - Clock abstraction, hash type aliases
//! - `metrics.rs` - Global atomic metrics

mod metrics;
mod time;

pub use metrics::{GlobalMetrics, MetricsSnapshot};
pub use time::{now_ms, Clock, GxHashMap, ManualClock, SystemClock};
