//! mediaq - durable job queue and worker orchestration for media downloads.
//!
//! The library exposes the queue registry, the store contract, the worker
//! pool and the HTTP admission API. The binary in `main.rs` wires them
//! together; media services embed the library and register their own
//! download processors.

pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod queue;
pub mod telemetry;
