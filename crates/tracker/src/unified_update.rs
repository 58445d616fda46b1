//! Rebuilds derived usage tables from raw sessions.
//!
//! For each date the pipeline loads counted app sessions and finished
//! timers, buckets them into hourly slots, totals the slots into day, week
//! and month summaries, scores goals and rolls the scores up. The date's
//! rows are then swapped in with `AggregateRepository::apply_day`.
//!
//! A day is only scored once it is over, so `catch_up` revisits every date
//! since the previous pass. It runs shortly after each local midnight and
//! before backups and reminders read yesterday's rows.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use domain::models::{Goal, RewardPunishmentDay, SummaryPeriod, SummaryUsage};
use domain::services::{
    day_summaries, evaluate_day, hourly_slots, next_daily_run, period_summaries, rollup,
    should_evaluate, UsageInterval,
};
use persistence::repositories::{
    AggregateRepository, DayRewrite, GoalRepository, SessionRepository, SettingsRepository,
};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Result, TrackerError};

/// Longest range a single update may cover.
pub const MAX_UPDATE_DAYS: i64 = 366;

/// Oldest date a catch-up or rebuild reaches back to.
fn earliest(today: NaiveDate) -> NaiveDate {
    today - Duration::days(MAX_UPDATE_DAYS - 1)
}

#[derive(Clone)]
pub struct UnifiedUpdateService {
    sessions: SessionRepository,
    aggregates: AggregateRepository,
    goals: GoalRepository,
    settings: SettingsRepository,
    offset: FixedOffset,
}

impl UnifiedUpdateService {
    pub fn new(pool: SqlitePool, offset: FixedOffset) -> Self {
        Self {
            sessions: SessionRepository::new(pool.clone()),
            aggregates: AggregateRepository::new(pool.clone()),
            goals: GoalRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool),
            offset,
        }
    }

    /// Local calendar date of `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Recompute every date in `[from, to]`. Returns the number of dates.
    pub async fn update_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) -> Result<usize> {
        if from > to {
            return Err(TrackerError::InvalidInput(format!(
                "Range start {} is after its end {}",
                from, to
            )));
        }
        if (to - from).num_days() >= MAX_UPDATE_DAYS {
            return Err(TrackerError::InvalidInput(format!(
                "Range is longer than {} days",
                MAX_UPDATE_DAYS
            )));
        }

        let mut updated = 0;
        for date in from.iter_days().take_while(|d| *d <= to) {
            self.update_day(date, today).await?;
            updated += 1;
        }
        info!(%from, %to, days = updated, "Usage aggregates updated");
        Ok(updated)
    }

    /// Recompute every date from the previous catch-up (or install) through
    /// today, then remember today as the last pass.
    ///
    /// The previous pass's "today" is included: it has ended since and can
    /// now be scored.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Result<usize> {
        let today = self.today(now);
        let from = match self.settings.last_rollover().await? {
            Some(date) => date,
            None => self.install_date().await?,
        };
        let updated = self
            .update_range(from.clamp(earliest(today), today), today, today)
            .await?;
        self.settings.set_last_rollover(today).await?;
        Ok(updated)
    }

    /// Recompute every date since install. Used after a goal or toggle
    /// change, which affects the scoring of all past days.
    pub async fn rebuild(&self, now: DateTime<Utc>) -> Result<usize> {
        let today = self.today(now);
        let from = self.install_date().await?.clamp(earliest(today), today);
        self.update_range(from, today, today).await
    }

    /// Recompute the given dates, skipping any after today.
    pub async fn update_dates(
        &self,
        dates: impl IntoIterator<Item = NaiveDate>,
        today: NaiveDate,
    ) -> Result<usize> {
        let mut updated = 0;
        for date in dates.into_iter().filter(|d| *d <= today) {
            self.update_day(date, today).await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Catch up now and again a few minutes after every local midnight.
    pub fn spawn_daily(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let at = NaiveTime::from_hms_opt(0, 5, 0).unwrap_or(NaiveTime::MIN);
            loop {
                if let Err(e) = self.catch_up(Utc::now()).await {
                    error!(error = %e, "Daily usage update failed");
                }
                let now = Utc::now();
                let wait = (next_daily_run(now, at, self.offset) - now)
                    .to_std()
                    .unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Daily usage updates stopped");
        })
    }

    async fn install_date(&self) -> Result<NaiveDate> {
        let install_time = self.settings.app_settings().await?.install_time;
        DateTime::from_timestamp_millis(install_time)
            .map(|t| t.with_timezone(&self.offset).date_naive())
            .ok_or_else(|| {
                TrackerError::InvalidInput(format!("Install time {} is out of range", install_time))
            })
    }

    /// Recompute one date and store the result.
    pub async fn update_day(&self, date: NaiveDate, today: NaiveDate) -> Result<DayRewrite> {
        let rewrite = self.compute_day(date, today).await?;
        self.aggregates.apply_day(&rewrite).await?;
        debug!(
            %date,
            slots = rewrite.slots.len(),
            reward_days = rewrite.reward_days.len(),
            "Day rewritten"
        );
        Ok(rewrite)
    }

    /// Epoch-millisecond bounds of the local day `date`.
    fn day_bounds(&self, date: NaiveDate) -> (i64, i64) {
        let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
            - self.offset.local_minus_utc() as i64 * 1000;
        (start, start + Duration::days(1).num_milliseconds())
    }

    async fn intervals(&self, date: NaiveDate) -> Result<Vec<UsageInterval>> {
        let (start_ms, end_ms) = self.day_bounds(date);

        let apps = self
            .sessions
            .counted_app_sessions_between(start_ms, end_ms)
            .await?;
        let timers = self
            .sessions
            .finished_timers_between(start_ms, end_ms)
            .await?;

        let mut intervals: Vec<UsageInterval> = apps
            .into_iter()
            .map(|s| UsageInterval {
                category_id: s.category_id,
                start_ms: s.start_time,
                end_ms: s.end_time,
                is_offline: s.is_offline,
            })
            .collect();
        intervals.extend(timers.into_iter().filter_map(|t| {
            Some(UsageInterval {
                category_id: t.category_id,
                start_ms: t.start_time,
                end_ms: t.end_time?,
                is_offline: true,
            })
        }));
        Ok(intervals)
    }

    async fn compute_day(&self, date: NaiveDate, today: NaiveDate) -> Result<DayRewrite> {
        let intervals = self.intervals(date).await?;
        let slots = hourly_slots(date, &intervals, self.offset);
        let day = day_summaries(date, &slots);

        let week_summaries = self
            .period_summaries(SummaryPeriod::Week, date, today, &day)
            .await?;
        let month_summaries = self
            .period_summaries(SummaryPeriod::Month, date, today, &day)
            .await?;

        let reward_days = self.reward_days(date, today, &day).await?;
        let week_rollups = self
            .rollups(SummaryPeriod::Week, date, &reward_days)
            .await?;
        let month_rollups = self
            .rollups(SummaryPeriod::Month, date, &reward_days)
            .await?;

        Ok(DayRewrite {
            date,
            slots,
            day_summaries: day,
            week_summaries,
            month_summaries,
            reward_days,
            week_rollups,
            month_rollups,
        })
    }

    /// Summaries of the period around `date`: stored day totals of the
    /// other days plus the freshly computed ones.
    async fn period_summaries(
        &self,
        period: SummaryPeriod,
        date: NaiveDate,
        today: NaiveDate,
        day: &[SummaryUsage],
    ) -> Result<Vec<SummaryUsage>> {
        let stored = self
            .aggregates
            .day_summaries_between(period.start_of(date), period.end_of(date))
            .await?;
        let mut days: Vec<(NaiveDate, SummaryUsage)> =
            stored.into_iter().filter(|(d, _)| *d != date).collect();
        days.extend(day.iter().cloned().map(|s| (date, s)));
        Ok(period_summaries(period, date, today, &days))
    }

    async fn reward_days(
        &self,
        date: NaiveDate,
        today: NaiveDate,
        day: &[SummaryUsage],
    ) -> Result<Vec<RewardPunishmentDay>> {
        let settings = self.settings.app_settings().await?;
        let goals: Vec<Goal> = self.goals.list().await?.into_iter().map(Into::into).collect();
        let previous: Vec<RewardPunishmentDay> = self
            .aggregates
            .reward_days_between(date, date)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let records = goals
            .iter()
            .filter(|goal| {
                should_evaluate(
                    date,
                    today,
                    settings.reward_punishment_enabled(goal.category_id),
                )
            })
            .map(|goal| {
                let usage = day
                    .iter()
                    .find(|s| s.category_id == goal.category_id)
                    .map(|s| s.total_seconds)
                    .unwrap_or(0);
                let prev = previous.iter().find(|p| p.category_id == goal.category_id);
                evaluate_day(date, goal, usage, prev)
            })
            .collect();
        Ok(records)
    }

    async fn rollups(
        &self,
        period: SummaryPeriod,
        date: NaiveDate,
        fresh: &[RewardPunishmentDay],
    ) -> Result<Vec<domain::models::RewardPunishmentRollup>> {
        let stored = self
            .aggregates
            .reward_days_between(period.start_of(date), period.end_of(date))
            .await?;
        let mut days: Vec<RewardPunishmentDay> = stored
            .into_iter()
            .map(RewardPunishmentDay::from)
            .filter(|d| d.date != date)
            .collect();
        days.extend(fresh.iter().cloned());

        let categories: BTreeSet<i64> = days.iter().map(|d| d.category_id).collect();
        Ok(categories
            .into_iter()
            .map(|category_id| rollup(period, date, category_id, &days))
            .collect())
    }
}
