//! Queue module - durable job queue, lifecycle and worker orchestration.
//!
//! ## Module Organization
//!
//! - `manager.rs` - QueueManager (the queue registry), registration, events, shutdown
//! - `store/` - Durable store contract and the in-process `MemoryStore`
//! - `types/` - Clock, hash aliases, GlobalMetrics
//! - `background/` - Stall detection, retention sweeps, session purge
//!
//! ### Core operations
//!
//! - `validation.rs` - Queue name and payload validation
//! - `push.rs` - Admission (`enqueue`)
//! - `pull.rs` - Claim, lock renewal, progress
//! - `ack.rs` - Complete, fail with backoff, cancelled
//! - `query.rs` - get_job, list_jobs
//!
//! ### Feature modules
//!
//! - `job_ops.rs` - Cancel, retry, delete, pause/resume, sessions
//! - `quota.rs` - Per-user quota and ownership checks
//! - `worker.rs` - Processor registration and claim loops
//! - `monitoring.rs` - Queue stats and metrics

mod background;
mod manager;
pub mod quota;
pub mod store;
pub mod types;

mod ack;
mod pull;
mod push;
mod query;
pub mod validation;

mod job_ops;
mod monitoring;
pub mod worker;

#[cfg(test)]
mod tests;

pub use ack::summarize_error;
pub use manager::{QueueEntry, QueueManager, QueueRegistry};
pub use quota::{QuotaDecision, QuotaGuard, QuotaStore};
pub use store::{LockRenewal, MemoryStore, StallOutcome, StallRecovery, Store};
pub use types::{Clock, ManualClock, MetricsSnapshot, SystemClock};
pub use worker::{JobContext, Processor, WorkerHandle};
