//! Drop backups older than each user's retention window.

use chrono::{NaiveTime, Utc};
use persistence::repositories::BackupRepository;
use sqlx::SqlitePool;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

pub struct BackupRetentionJob {
    pool: SqlitePool,
    default_retention_days: i32,
}

impl BackupRetentionJob {
    pub fn new(pool: SqlitePool, default_retention_days: i32) -> Self {
        Self {
            pool,
            default_retention_days,
        }
    }
}

#[async_trait::async_trait]
impl Job for BackupRetentionJob {
    fn name(&self) -> &'static str {
        "backup_retention"
    }

    /// After the nightly client uploads have settled.
    fn frequency(&self) -> JobFrequency {
        JobFrequency::DailyAt(NaiveTime::from_hms_opt(4, 15, 0).unwrap_or(NaiveTime::MIN))
    }

    async fn execute(&self) -> Result<u64, String> {
        let today = Utc::now().date_naive();
        let purged = BackupRepository::new(self.pool.clone())
            .purge_expired(today, self.default_retention_days)
            .await
            .map_err(|e| e.to_string())?;
        metrics::counter!("offtimes_backups_purged_total").increment(purged);
        if purged > 0 {
            info!(purged, "Purged expired backups");
        }
        Ok(purged)
    }
}
