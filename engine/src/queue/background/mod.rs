//! Background maintenance for mediaq.
//!
//! Module organization:
//! - `stalled.rs` - Stall detection and recovery
//! - `cleanup.rs` - Retention sweeps and expired session purge

mod cleanup;
mod stalled;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use super::manager::QueueManager;

impl QueueManager {
    /// Run maintenance until shutdown. Every `tick` it wakes idle claim
    /// loops (so due delayed jobs get picked up) and runs each queue's stall
    /// check and retention sweep once their own intervals have elapsed.
    pub async fn background_tasks(self: Arc<Self>, tick: Duration) {
        let mut maintenance_ticker = interval(tick.max(Duration::from_millis(1)));
        maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut session_ticker = interval(Duration::from_secs(60));
        session_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_ms = tick.as_millis() as u64, "Background tasks started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Background tasks stopped");
                    return;
                }
                _ = maintenance_ticker.tick() => {
                    self.run_due_maintenance().await;
                }
                _ = session_ticker.tick() => {
                    self.purge_expired_sessions().await;
                }
            }
        }
    }

    /// One maintenance pass over every registered queue.
    pub async fn run_due_maintenance(&self) {
        let now = self.now_ms();
        for entry in self.queue_entries() {
            let queue = entry.config.name.as_str();
            self.notify_queue(&entry);

            if now >= entry.next_stall_check.load(Ordering::Acquire) {
                entry
                    .next_stall_check
                    .store(now.saturating_add(entry.config.stalled_check_interval_ms), Ordering::Release);
                if let Err(e) = self.check_stalled_jobs(queue).await {
                    warn!(queue = %queue, error = %e, "Stall check failed");
                }
            }

            if now >= entry.next_sweep.load(Ordering::Acquire) {
                entry
                    .next_sweep
                    .store(now.saturating_add(entry.config.retention.sweep_interval_ms), Ordering::Release);
                if let Err(e) = self.sweep_retention(queue).await {
                    warn!(queue = %queue, error = %e, "Retention sweep failed");
                }
            }
        }
    }
}
