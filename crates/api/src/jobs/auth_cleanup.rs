//! Expired SMS codes, expired sessions and lapsed trials.

use chrono::{Duration, Utc};
use persistence::repositories::{SmsCodeRepository, UserRepository};
use sqlx::SqlitePool;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

pub struct AuthCleanupJob {
    pool: SqlitePool,
    trial_days: i64,
}

impl AuthCleanupJob {
    pub fn new(pool: SqlitePool, trial_days: i64) -> Self {
        Self { pool, trial_days }
    }

    /// One cleanup pass. Returns (codes, sessions, trials) affected.
    pub async fn run(&self) -> Result<(u64, u64, u64), sqlx::Error> {
        let now = Utc::now();
        let codes = SmsCodeRepository::new(self.pool.clone())
            .delete_expired(now)
            .await?;
        let users = UserRepository::new(self.pool.clone());
        let sessions = users.delete_expired_sessions(now).await?;
        let trials = users
            .expire_trials(now - Duration::days(self.trial_days))
            .await?;
        Ok((codes, sessions, trials))
    }
}

#[async_trait::async_trait]
impl Job for AuthCleanupJob {
    fn name(&self) -> &'static str {
        "auth_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Every(std::time::Duration::from_secs(3600))
    }

    async fn execute(&self) -> Result<u64, String> {
        let (codes, sessions, trials) = self.run().await.map_err(|e| e.to_string())?;
        if codes + sessions + trials > 0 {
            info!(
                sms_codes = codes,
                sessions,
                expired_trials = trials,
                "Removed stale auth records"
            );
        }
        Ok(codes + sessions + trials)
    }
}
