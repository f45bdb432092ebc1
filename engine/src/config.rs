//! Queue and server configuration.
//!
//! Queue settings are plain values validated at registration time. Server
//! settings come from environment variables with defaults.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

pub const DOWNLOAD_QUEUE: &str = "downloads";

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_ceiling_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            backoff_ceiling_ms: 60_000,
        }
    }
}

/// Age and count limits for one terminal state. `None` disables the limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    pub max_age_ms: Option<u64>,
    pub max_count: Option<usize>,
}

impl RetentionRule {
    pub fn new(max_age_ms: u64, max_count: usize) -> Self {
        Self {
            max_age_ms: Some(max_age_ms),
            max_count: Some(max_count),
        }
    }

    pub fn keep_forever() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub completed: RetentionRule,
    pub failed: RetentionRule,
    pub cancelled: RetentionRule,
    pub sweep_interval_ms: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed: RetentionRule::new(DAY_MS, 1_000),
            failed: RetentionRule::new(7 * DAY_MS, 1_000),
            cancelled: RetentionRule::new(HOUR_MS, 1_000),
            sweep_interval_ms: 60_000,
        }
    }
}

/// Per-user admission limit over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub limit: u32,
    pub window_ms: u64,
}

/// Expected payload shape for a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    /// Any JSON object carrying a non-empty `userId`.
    #[default]
    Generic,
    /// `DownloadPayload`.
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: CompactString,
    pub concurrency: u32,
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
    pub quota: Option<QuotaConfig>,
    pub schema: PayloadSchema,
    pub lock_duration_ms: u64,
    pub lock_renew_interval_ms: u64,
    pub stalled_check_interval_ms: u64,
    pub max_stalled_count: u32,
    /// How long an idle claim loop waits for a notification before polling the store again.
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            concurrency: 1,
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
            quota: None,
            schema: PayloadSchema::Generic,
            lock_duration_ms: 30_000,
            lock_renew_interval_ms: 15_000,
            stalled_check_interval_ms: 30_000,
            max_stalled_count: 1,
            poll_interval_ms: 1_000,
        }
    }

    /// Preset for the media download queue.
    pub fn download() -> Self {
        Self::new(DOWNLOAD_QUEUE)
            .concurrency(3)
            .schema(PayloadSchema::Download)
            .quota(5, HOUR_MS)
            .retention(RetentionPolicy {
                completed: RetentionRule::new(DAY_MS, 100),
                failed: RetentionRule::new(7 * DAY_MS, 500),
                cancelled: RetentionRule::new(HOUR_MS, 100),
                sweep_interval_ms: 60_000,
            })
    }

    pub fn concurrency(mut self, n: u32) -> Self {
        self.concurrency = n;
        self
    }

    pub fn retry(mut self, max_attempts: u32, base_delay_ms: u64, backoff_ceiling_ms: u64) -> Self {
        self.retry = RetryPolicy {
            max_attempts,
            base_delay_ms,
            backoff_ceiling_ms,
        };
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn quota(mut self, limit: u32, window_ms: u64) -> Self {
        self.quota = Some(QuotaConfig { limit, window_ms });
        self
    }

    pub fn schema(mut self, schema: PayloadSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn lock(mut self, duration_ms: u64, renew_interval_ms: u64) -> Self {
        self.lock_duration_ms = duration_ms;
        self.lock_renew_interval_ms = renew_interval_ms;
        self
    }

    pub fn stalled(mut self, check_interval_ms: u64, max_stalled_count: u32) -> Self {
        self.stalled_check_interval_ms = check_interval_ms;
        self.max_stalled_count = max_stalled_count;
        self
    }

    pub fn poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Reject configurations that would break lock or retry invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(QueueError::Validation("queue name is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(QueueError::Validation(format!(
                "queue {}: concurrency must be at least 1",
                self.name
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(QueueError::Validation(format!(
                "queue {}: max_attempts must be at least 1",
                self.name
            )));
        }
        if self.retry.base_delay_ms > self.retry.backoff_ceiling_ms {
            return Err(QueueError::Validation(format!(
                "queue {}: base delay exceeds backoff ceiling",
                self.name
            )));
        }
        if self.lock_duration_ms == 0 || self.lock_renew_interval_ms == 0 {
            return Err(QueueError::Validation(format!(
                "queue {}: lock timings must be positive",
                self.name
            )));
        }
        if self.lock_renew_interval_ms >= self.lock_duration_ms {
            return Err(QueueError::Validation(format!(
                "queue {}: lock_renew_interval ({}ms) must be shorter than lock_duration ({}ms)",
                self.name, self.lock_renew_interval_ms, self.lock_duration_ms
            )));
        }
        if self.stalled_check_interval_ms == 0 || self.retention.sweep_interval_ms == 0 {
            return Err(QueueError::Validation(format!(
                "queue {}: maintenance intervals must be positive",
                self.name
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(QueueError::Validation(format!(
                "queue {}: poll_interval must be positive",
                self.name
            )));
        }
        if let Some(q) = self.quota {
            if q.limit == 0 || q.window_ms == 0 {
                return Err(QueueError::Validation(format!(
                    "queue {}: quota limit and window must be positive",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Process-level settings for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub http_port: u16,
    pub shutdown_timeout_secs: u64,
    pub maintenance_tick_ms: u64,
    pub download: QueueConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut download = QueueConfig::download();
        if let Some(n) = env_parse("DOWNLOAD_CONCURRENCY") {
            download.concurrency = n;
        }
        if let Some(n) = env_parse("DOWNLOAD_MAX_ATTEMPTS") {
            download.retry.max_attempts = n;
        }
        let quota_limit = env_parse("DOWNLOAD_QUOTA_LIMIT");
        let quota_window = env_parse("DOWNLOAD_QUOTA_WINDOW_MS");
        if quota_limit.is_some() || quota_window.is_some() {
            let current = download.quota.unwrap_or(QuotaConfig {
                limit: 5,
                window_ms: HOUR_MS,
            });
            download.quota = Some(QuotaConfig {
                limit: quota_limit.unwrap_or(current.limit),
                window_ms: quota_window.unwrap_or(current.window_ms),
            });
        }

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("HTTP_PORT").unwrap_or(6790),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS").unwrap_or(30),
            maintenance_tick_ms: env_parse("MAINTENANCE_TICK_MS").unwrap_or(250),
            download,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.maintenance_tick_ms == 0 {
            return Err(QueueError::Validation(
                "MAINTENANCE_TICK_MS must be positive".into(),
            ));
        }
        self.download.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
