//! Daily backup at the user's chosen time, with retries.

use chrono::{FixedOffset, NaiveTime, Utc};
use domain::services::{next_daily_run, Backoff};
use persistence::repositories::SettingsRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::manager::{BackupManager, BackupRun};
use crate::client::BackupUploader;
use crate::config::DeviceConfig;

/// Device state a backup depends on.
pub trait RunConditions: Send + Sync {
    fn network_available(&self) -> bool;

    fn unmetered(&self) -> bool;

    fn battery_low(&self) -> bool;

    /// Why a run may not start now, if anything.
    fn blocker(&self, wifi_only: bool) -> Option<&'static str> {
        if !self.network_available() {
            Some("no network")
        } else if wifi_only && !self.unmetered() {
            Some("metered network")
        } else if self.battery_low() {
            Some("battery low")
        } else {
            None
        }
    }
}

/// Conditions read from the tracker configuration.
#[derive(Debug, Clone)]
pub struct StaticConditions(pub DeviceConfig);

impl RunConditions for StaticConditions {
    fn network_available(&self) -> bool {
        self.0.network_available
    }

    fn unmetered(&self) -> bool {
        self.0.unmetered
    }

    fn battery_low(&self) -> bool {
        self.0.battery_low
    }
}

/// Result of one scheduled slot, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResult {
    Ran(BackupRun),
    GaveUp { attempts: u32 },
    Cancelled,
}

/// Waits until `delay` elapses or shutdown is signalled. Returns false on shutdown.
async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = shutdown_rx.changed() => !(changed.is_err() || *shutdown_rx.borrow()),
    }
}

pub struct BackupScheduler<U> {
    manager: Arc<BackupManager<U>>,
    settings: SettingsRepository,
    conditions: Arc<dyn RunConditions>,
    backoff: Backoff,
    offset: FixedOffset,
}

impl<U: BackupUploader + 'static> BackupScheduler<U> {
    pub fn new(
        manager: Arc<BackupManager<U>>,
        settings: SettingsRepository,
        conditions: Arc<dyn RunConditions>,
        backoff: Backoff,
        offset: FixedOffset,
    ) -> Self {
        Self {
            manager,
            settings,
            conditions,
            backoff,
            offset,
        }
    }

    /// Run one slot: try, then retry with backoff until a run completes or
    /// the attempts are used up.
    ///
    /// Unmet run conditions count as a failed attempt.
    pub async fn run_slot(&self, shutdown_rx: &mut watch::Receiver<bool>) -> SlotResult {
        let mut attempt = 0;
        loop {
            match self.try_once().await {
                Ok(run) => return SlotResult::Ran(run),
                Err(reason) => warn!(attempt, reason = %reason, "Backup attempt failed"),
            }

            attempt += 1;
            let Some(delay) = self.backoff.delay_for(attempt) else {
                error!(attempts = attempt, "Backup retries exhausted for today");
                return SlotResult::GaveUp { attempts: attempt };
            };
            info!(attempt, delay_secs = delay.as_secs(), "Retrying backup");
            if !sleep_or_shutdown(delay, shutdown_rx).await {
                return SlotResult::Cancelled;
            }
        }
    }

    async fn try_once(&self) -> Result<BackupRun, String> {
        let settings = self
            .settings
            .backup_settings()
            .await
            .map_err(|e| e.to_string())?;
        if let Some(blocker) = self.conditions.blocker(settings.wifi_only) {
            return Err(blocker.to_string());
        }
        self.manager
            .run_once(Utc::now())
            .await
            .map_err(|e| e.to_string())
    }

    /// Run daily until shutdown is signalled.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Backup scheduler started");
            loop {
                let at = match self.settings.backup_settings().await {
                    Ok(s) => NaiveTime::from_hms_opt(s.backup_hour, s.backup_minute, 0)
                        .unwrap_or(NaiveTime::MIN),
                    Err(e) => {
                        error!(error = %e, "Could not read backup settings");
                        if !sleep_or_shutdown(Duration::from_secs(60), &mut shutdown_rx).await {
                            break;
                        }
                        continue;
                    }
                };

                let now = Utc::now();
                let next = next_daily_run(now, at, self.offset);
                let wait = (next - now).to_std().unwrap_or_default();
                info!(next_run = %next, "Next backup scheduled");
                if !sleep_or_shutdown(wait, &mut shutdown_rx).await {
                    break;
                }

                if self.run_slot(&mut shutdown_rx).await == SlotResult::Cancelled {
                    break;
                }
            }
            info!("Backup scheduler stopped");
        })
    }
}
