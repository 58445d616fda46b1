//! Intake of foreground intervals reported by the platform.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use domain::models::AppInfo;
use persistence::repositories::{
    AppInfoRepository, CategoryRepository, NewAppSession, SessionRepository, SettingsRepository,
};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{Result, TrackerError};

#[derive(Clone)]
pub struct UsageRecorder {
    apps: AppInfoRepository,
    categories: CategoryRepository,
    sessions: SessionRepository,
    settings: SettingsRepository,
    offset: FixedOffset,
}

impl UsageRecorder {
    pub fn new(pool: SqlitePool, offset: FixedOffset) -> Self {
        Self {
            apps: AppInfoRepository::new(pool.clone()),
            categories: CategoryRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool),
            offset,
        }
    }

    /// Category of `package_name`, registering the app under the default
    /// category the first time it is seen.
    async fn category_for(&self, package_name: &str) -> Result<i64> {
        if let Some(app) = self.apps.find(package_name).await? {
            return Ok(app.category_id);
        }
        let category_id = self.settings.app_settings().await?.default_category_id;
        self.apps
            .upsert(&AppInfo {
                package_name: package_name.to_string(),
                app_name: package_name.to_string(),
                version_name: None,
                category_id,
                is_system: false,
                is_enabled: true,
                is_excluded: false,
            })
            .await?;
        Ok(category_id)
    }

    /// Store one foreground interval. Returns the local dates it touches so
    /// the caller can refresh their aggregates, or nothing for a duplicate.
    pub async fn record(
        &self,
        package_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>> {
        if package_name.trim().is_empty() {
            return Err(TrackerError::InvalidInput(
                "Package name is required".to_string(),
            ));
        }
        if end < start {
            return Err(TrackerError::InvalidInput(
                "Session ends before it starts".to_string(),
            ));
        }

        let category_id = self.category_for(package_name).await?;
        let first = start.with_timezone(&self.offset).date_naive();
        let last = end.with_timezone(&self.offset).date_naive();

        let inserted = self
            .sessions
            .insert_app_session(&NewAppSession {
                package_name,
                category_id,
                date: first,
                start_time: start.timestamp_millis(),
                end_time: end.timestamp_millis(),
            })
            .await?;
        if !inserted {
            debug!(package_name, "Duplicate session ignored");
            return Ok(Vec::new());
        }

        Ok(first.iter_days().take_while(|d| *d <= last).collect())
    }

    /// Move an app (and its history) to another category. Returns the
    /// local dates whose aggregates now need recomputing.
    pub async fn assign_category(
        &self,
        package_name: &str,
        category_id: i64,
    ) -> Result<Vec<NaiveDate>> {
        if self.categories.find_by_id(category_id).await?.is_none() {
            return Err(TrackerError::UnknownCategory(category_id));
        }
        let previous = self.category_for(package_name).await?;
        self.apps.set_category(package_name, category_id).await?;
        if previous == category_id {
            return Ok(Vec::new());
        }
        self.history_dates(package_name).await
    }

    /// Exclude an app from all statistics, or count it again. Returns the
    /// local dates whose aggregates now need recomputing.
    pub async fn set_excluded(&self, package_name: &str, excluded: bool) -> Result<Vec<NaiveDate>> {
        self.category_for(package_name).await?;
        if !self.apps.set_excluded(package_name, excluded).await? {
            return Ok(Vec::new());
        }
        self.history_dates(package_name).await
    }

    /// Every local date touched by a stored session of `package_name`.
    async fn history_dates(&self, package_name: &str) -> Result<Vec<NaiveDate>> {
        let mut dates = BTreeSet::new();
        for (start, end) in self.sessions.app_session_spans(package_name).await? {
            let (Some(start), Some(end)) = (
                DateTime::from_timestamp_millis(start),
                DateTime::from_timestamp_millis(end),
            ) else {
                continue;
            };
            let first = start.with_timezone(&self.offset).date_naive();
            let last = end.with_timezone(&self.offset).date_naive();
            dates.extend(first.iter_days().take_while(|d| *d <= last));
        }
        Ok(dates.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_record_spanning_midnight() {
        let pool = crate::store::open_in_memory(Utc::now()).await.unwrap();
        let recorder = UsageRecorder::new(pool, FixedOffset::east_opt(0).unwrap());
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();

        let dates = recorder
            .record("com.example.video", start, start + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
            ]
        );

        let again = recorder
            .record("com.example.video", start, start + Duration::hours(1))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_record_rejects_bad_interval() {
        let pool = crate::store::open_in_memory(Utc::now()).await.unwrap();
        let recorder = UsageRecorder::new(pool, FixedOffset::east_opt(0).unwrap());
        let now = Utc::now();
        assert!(recorder
            .record("com.example.chat", now, now - Duration::minutes(1))
            .await
            .is_err());
        assert!(matches!(
            recorder.assign_category("com.example.chat", 404).await,
            Err(TrackerError::UnknownCategory(404))
        ));
    }

    #[tokio::test]
    async fn test_history_dates_of_changed_app() {
        let pool = crate::store::open_in_memory(Utc::now()).await.unwrap();
        let recorder = UsageRecorder::new(pool, FixedOffset::east_opt(0).unwrap());
        let day = |d| Utc.with_ymd_and_hms(2024, 3, d, 23, 30, 0).unwrap();
        for d in [1, 4] {
            recorder
                .record("com.example.video", day(d), day(d) + Duration::hours(1))
                .await
                .unwrap();
        }
        let expected: Vec<NaiveDate> = [1, 2, 4, 5]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .collect();

        assert_eq!(
            recorder.set_excluded("com.example.video", true).await.unwrap(),
            expected
        );
        assert_eq!(
            recorder.assign_category("com.example.video", 2).await.unwrap(),
            expected
        );
        // Same category again: nothing moves
        assert!(recorder
            .assign_category("com.example.video", 2)
            .await
            .unwrap()
            .is_empty());
        // Never-seen app has no history
        assert!(recorder
            .set_excluded("com.example.chat", true)
            .await
            .unwrap()
            .is_empty());
    }
}
