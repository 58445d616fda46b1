use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use domain::models::{
    AppSession, BackupOutcome, BackupTable, BackupUploadRequest, RewardPunishmentDay,
    SummaryPeriod, TimerSession,
};
use persistence::repositories::{AggregateRepository, SessionRepository, SettingsRepository};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::client::BackupUploader;
use crate::error::Result;
use crate::unified_update::UnifiedUpdateService;

/// Why a backup run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotSignedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupRun {
    Skipped(SkipReason),
    Finished(BackupOutcome),
}

/// Snapshots one day of the usage store and sends it to the server.
pub struct BackupManager<U> {
    sessions: SessionRepository,
    aggregates: AggregateRepository,
    settings: SettingsRepository,
    updater: UnifiedUpdateService,
    uploader: U,
    offset: FixedOffset,
}

fn rows<T: Serialize>(items: impl IntoIterator<Item = T>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

impl<U: BackupUploader> BackupManager<U> {
    pub fn new(pool: SqlitePool, uploader: U, offset: FixedOffset) -> Self {
        Self {
            sessions: SessionRepository::new(pool.clone()),
            aggregates: AggregateRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool.clone()),
            updater: UnifiedUpdateService::new(pool, offset),
            uploader,
            offset,
        }
    }

    /// The local day before `now`; the day a scheduled run backs up.
    pub fn backup_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now.with_timezone(&self.offset) - Duration::days(1)).date_naive()
    }

    /// One upload per backed-up table, holding that table's rows for `date`.
    pub async fn collect(&self, date: NaiveDate) -> Result<Vec<BackupUploadRequest>> {
        let mut requests = Vec::with_capacity(BackupTable::ALL.len());
        for table in BackupTable::ALL {
            let data = match table {
                BackupTable::AppSessions => rows(
                    self.sessions
                        .app_sessions_for_date(date)
                        .await?
                        .into_iter()
                        .map(AppSession::from),
                )?,
                // A running timer has no final duration yet
                BackupTable::TimerSessions => rows(
                    self.sessions
                        .timer_sessions_for_date(date)
                        .await?
                        .into_iter()
                        .map(TimerSession::from)
                        .filter(|t| !t.is_active),
                )?,
                BackupTable::SummaryUsageDay => rows(
                    self.aggregates
                        .summaries(SummaryPeriod::Day, &SummaryPeriod::Day.key_for(date))
                        .await?,
                )?,
                BackupTable::RewardPunishmentDay => rows(
                    self.aggregates
                        .reward_days_between(date, date)
                        .await?
                        .into_iter()
                        .map(RewardPunishmentDay::from),
                )?,
            };
            requests.push(BackupUploadRequest {
                table_name: table.as_str().to_string(),
                backup_date: date,
                data,
            });
        }
        Ok(requests)
    }

    /// Back up yesterday and record the outcome.
    ///
    /// A failed upload is recorded and returned as the error.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<BackupRun> {
        self.run_for(self.backup_date(now), now).await
    }

    pub async fn run_for(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<BackupRun> {
        let settings = self.settings.backup_settings().await?;
        if !settings.enabled {
            return Ok(BackupRun::Skipped(SkipReason::Disabled));
        }
        if !self.settings.account_state().await?.is_signed_in() {
            return Ok(BackupRun::Skipped(SkipReason::NotSignedIn));
        }

        match self.refresh_and_upload(date, now).await {
            Ok(outcome) => {
                self.settings
                    .record_backup_result(outcome, None, now.timestamp_millis())
                    .await?;
                info!(%date, outcome = %outcome, "Backup finished");
                Ok(BackupRun::Finished(outcome))
            }
            Err(e) => {
                error!(%date, error = %e, "Backup failed");
                self.settings
                    .record_backup_result(
                        BackupOutcome::Failure,
                        Some(&e.to_string()),
                        now.timestamp_millis(),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    async fn refresh_and_upload(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<BackupOutcome> {
        // Finished days get their summaries and scores before being read
        self.updater.catch_up(now).await?;
        self.upload_all(date).await
    }

    async fn upload_all(&self, date: NaiveDate) -> Result<BackupOutcome> {
        let mut changed = false;
        for request in self.collect(date).await? {
            let result = self.uploader.upload(&request).await?;
            changed |= !result.unchanged;
        }
        Ok(if changed {
            BackupOutcome::Success
        } else {
            BackupOutcome::Unchanged
        })
    }
}
