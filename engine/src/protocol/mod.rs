//! Protocol types shared by the queue engine and the HTTP API.

mod builder;
mod payload;
mod types;

pub use builder::JobBuilder;
pub use payload::{DownloadOptions, DownloadPayload, DownloadStatus};
pub use types::{
    BackoffPolicy, JobEvent, JobEventKind, JobHandle, JobOptions, JobRecord, JobState, Progress,
    ProgressMeta, QueueInfo, QueueStats, WorkerInfo,
};
