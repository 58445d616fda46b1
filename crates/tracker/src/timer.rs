//! Offline activity timers.
//!
//! At most one timer runs at a time. A stopped timer becomes a session dated
//! by the local day it started on.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use domain::models::TimerSession;
use persistence::repositories::{CategoryRepository, SessionRepository};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{Result, TrackerError};

/// A running timer and how long it has been running.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub session: TimerSession,
    pub elapsed_seconds: i64,
}

#[derive(Clone)]
pub struct TimerService {
    sessions: SessionRepository,
    categories: CategoryRepository,
    offset: FixedOffset,
}

impl TimerService {
    pub fn new(pool: SqlitePool, offset: FixedOffset) -> Self {
        Self {
            sessions: SessionRepository::new(pool.clone()),
            categories: CategoryRepository::new(pool),
            offset,
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub async fn start(
        &self,
        category_id: i64,
        program_name: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerSession> {
        let program_name = program_name.trim();
        if program_name.is_empty() {
            return Err(TrackerError::InvalidInput(
                "Program name is required".to_string(),
            ));
        }
        if self.categories.find_by_id(category_id).await?.is_none() {
            return Err(TrackerError::UnknownCategory(category_id));
        }
        if self.sessions.active_timer().await?.is_some() {
            return Err(TrackerError::TimerAlreadyRunning);
        }

        let started = self
            .sessions
            .start_timer(
                category_id,
                program_name,
                self.local_date(now),
                now.timestamp_millis(),
            )
            .await
            .map_err(|e| {
                // Lost a race with another start
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return TrackerError::TimerAlreadyRunning;
                    }
                }
                TrackerError::from(e)
            })?;

        info!(timer_id = started.id, category_id, program = program_name, "Timer started");
        Ok(started.into())
    }

    /// Stop the running timer at `now`.
    pub async fn stop(&self, now: DateTime<Utc>) -> Result<TimerSession> {
        let active: TimerSession = self
            .sessions
            .active_timer()
            .await?
            .ok_or(TrackerError::NoActiveTimer)?
            .into();

        let end_time = now.timestamp_millis().max(active.start_time);
        let duration = active.elapsed_seconds(end_time);
        let stopped = self
            .sessions
            .stop_timer(active.id, end_time, duration)
            .await?
            .ok_or(TrackerError::NoActiveTimer)?;

        info!(timer_id = stopped.id, duration_seconds = duration, "Timer stopped");
        Ok(stopped.into())
    }

    pub async fn active(&self, now: DateTime<Utc>) -> Result<Option<ActiveTimer>> {
        let Some(entity) = self.sessions.active_timer().await? else {
            return Ok(None);
        };
        let session: TimerSession = entity.into();
        let elapsed_seconds = session.elapsed_seconds(now.timestamp_millis());
        Ok(Some(ActiveTimer {
            session,
            elapsed_seconds,
        }))
    }
}
