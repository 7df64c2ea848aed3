//! ReaperLoop - Lease 期限切れの定期回収
//!
//! # フロー
//! 1. interval ごとに LeaseManager::sweep_expired() を呼ぶ
//! 2. 失敗はログに出すだけで、ループは止めない（次の tick で再試行）
//! 3. shutdown が来たら、実行中の sweep を終えてから抜ける

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::lease_manager::LeaseManager;
use crate::config::ConfigError;
use crate::ports::EntityStore;

/// Periodic expired-lease sweep.
pub struct ReaperLoop<S> {
    leases: Arc<LeaseManager<S>>,
    interval: Duration,
}

/// Handle of a spawned reaper.
/// - `shutdown_and_join()` で止めて終了を待つ
/// - handle を drop しても sender が落ちるので reaper は止まる
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

impl<S: EntityStore + 'static> ReaperLoop<S> {
    /// `interval` must be non-zero.
    pub fn new(leases: Arc<LeaseManager<S>>, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::Invalid("reaper interval must be non-zero".into()));
        }
        Ok(Self { leases, interval })
    }

    /// Interval from the manager's config.
    pub fn from_config(leases: Arc<LeaseManager<S>>) -> Result<Self, ConfigError> {
        let interval = leases.config().reaper_interval();
        Self::new(leases, interval)
    }

    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        ReaperHandle { shutdown_tx, join }
    }

    /// Run until `shutdown_rx` turns true or its sender is dropped.
    /// The first sweep happens immediately.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs_f64(), "reaper started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.leases.sweep_expired().await {
                warn!(error = %e, "expired lease sweep failed");
            }
        }

        info!("reaper stopped");
    }
}
