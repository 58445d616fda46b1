//! End-to-end tests of session intake and the aggregation pipeline.

mod common;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use common::{offset_hours, store, utc};
use domain::models::{Goal, GoalCondition, GoalFrequency, SummaryPeriod};
use offtimes_tracker::reminder::{Notifier, ReminderScheduler};
use offtimes_tracker::timer::TimerService;
use offtimes_tracker::unified_update::UnifiedUpdateService;
use offtimes_tracker::usage::UsageRecorder;
use persistence::repositories::{AggregateRepository, GoalRepository, SettingsRepository};
use std::sync::{Arc, Mutex};

const ENTERTAINMENT: i64 = 1;
const STUDY: i64 = 2;
const FITNESS: i64 = 3;

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn goal(category_id: i64, minutes: i32, condition: GoalCondition) -> Goal {
    Goal {
        category_id,
        daily_goal_minutes: minutes,
        condition,
        reward_text: "Dessert".to_string(),
        reward_amount: 1,
        reward_unit: "piece".to_string(),
        punishment_text: "Push-ups".to_string(),
        punishment_amount: 20,
        punishment_unit: "reps".to_string(),
        frequency: GoalFrequency::Daily,
    }
}

/// Monday 2024-03-04: 45 minutes of video, a 30 minute run and an hour of
/// an excluded game.
async fn seeded() -> (sqlx::SqlitePool, UnifiedUpdateService) {
    let pool = store(utc(2024, 2, 1, 8, 0)).await;
    let offset = offset_hours(0);
    let recorder = UsageRecorder::new(pool.clone(), offset);

    recorder
        .assign_category("com.example.video", ENTERTAINMENT)
        .await
        .unwrap();
    recorder
        .record("com.example.video", utc(2024, 3, 4, 10, 30), utc(2024, 3, 4, 11, 15))
        .await
        .unwrap();

    recorder
        .assign_category("com.example.game", ENTERTAINMENT)
        .await
        .unwrap();
    recorder
        .set_excluded("com.example.game", true)
        .await
        .unwrap();
    recorder
        .record("com.example.game", utc(2024, 3, 4, 12, 0), utc(2024, 3, 4, 13, 0))
        .await
        .unwrap();

    let timers = TimerService::new(pool.clone(), offset);
    timers
        .start(FITNESS, "Running", utc(2024, 3, 4, 18, 0))
        .await
        .unwrap();
    timers.stop(utc(2024, 3, 4, 18, 30)).await.unwrap();

    let goals = GoalRepository::new(pool.clone());
    goals
        .upsert(&goal(ENTERTAINMENT, 60, GoalCondition::LessOrEqual))
        .await
        .unwrap();
    goals
        .upsert(&goal(FITNESS, 45, GoalCondition::GreaterOrEqual))
        .await
        .unwrap();

    let updater = UnifiedUpdateService::new(pool.clone(), offset);
    (pool, updater)
}

#[tokio::test]
async fn test_slots_and_summaries() {
    let (pool, updater) = seeded().await;
    let days = updater
        .update_range(date(3, 4), date(3, 5), date(3, 6))
        .await
        .unwrap();
    assert_eq!(days, 2);

    let aggregates = AggregateRepository::new(pool);
    let slots: Vec<(i64, i32, bool, i64)> = aggregates
        .daily_usage(date(3, 4))
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.category_id, s.slot_index, s.is_offline, s.duration_seconds))
        .collect();
    assert_eq!(
        slots,
        vec![
            (ENTERTAINMENT, 10, false, 1800),
            (ENTERTAINMENT, 11, false, 900),
            (FITNESS, 18, true, 1800),
        ]
    );

    let day = aggregates
        .summaries(SummaryPeriod::Day, &SummaryPeriod::Day.key_for(date(3, 4)))
        .await
        .unwrap();
    assert_eq!(day.len(), 2);
    assert_eq!(day[0].category_id, ENTERTAINMENT);
    assert_eq!(day[0].total_seconds, 2700);
    assert_eq!(day[1].total_seconds, 1800);

    // Monday to Wednesday have elapsed
    let week = aggregates
        .summaries(SummaryPeriod::Week, &SummaryPeriod::Week.key_for(date(3, 4)))
        .await
        .unwrap();
    assert_eq!(week[0].total_seconds, 2700);
    assert_eq!(week[0].day_count, 3);
    assert_eq!(week[0].average_daily_seconds, 900);
}

#[tokio::test]
async fn test_goals_scored_and_rolled_up() {
    let (pool, updater) = seeded().await;
    updater
        .update_range(date(3, 4), date(3, 5), date(3, 6))
        .await
        .unwrap();

    let aggregates = AggregateRepository::new(pool.clone());
    let monday = aggregates
        .reward_days_between(date(3, 4), date(3, 4))
        .await
        .unwrap();
    assert_eq!(monday.len(), 2);
    let entertainment = &monday[0];
    assert_eq!(entertainment.category_id, ENTERTAINMENT);
    assert!(entertainment.goal_met);
    assert_eq!(entertainment.usage_seconds, 2700);
    assert_eq!(entertainment.goal_seconds, 3600);
    let fitness = &monday[1];
    assert!(!fitness.goal_met);
    assert_eq!(fitness.usage_seconds, 1800);

    let week_key = SummaryPeriod::Week.key_for(date(3, 4));
    let rollups = aggregates
        .rollups(SummaryPeriod::Week, &week_key)
        .await
        .unwrap();
    let entertainment = rollups
        .iter()
        .find(|r| r.category_id == ENTERTAINMENT)
        .unwrap();
    assert_eq!(entertainment.evaluated_days, 2);
    assert_eq!(entertainment.rewards_due, 2);
    assert_eq!(entertainment.rewards_done, 0);
    assert_eq!(entertainment.reward_completion_percent, 0);
    let fitness = rollups.iter().find(|r| r.category_id == FITNESS).unwrap();
    assert_eq!(fitness.punishments_due, 2);

    // Done flags survive recomputation and feed the rollup
    assert!(aggregates
        .mark_done(date(3, 4), ENTERTAINMENT, Some(true), None)
        .await
        .unwrap());
    updater.update_day(date(3, 4), date(3, 6)).await.unwrap();

    let monday = aggregates
        .reward_days_between(date(3, 4), date(3, 4))
        .await
        .unwrap();
    assert!(monday[0].reward_done);
    let rollups = aggregates
        .rollups(SummaryPeriod::Week, &week_key)
        .await
        .unwrap();
    let entertainment = rollups
        .iter()
        .find(|r| r.category_id == ENTERTAINMENT)
        .unwrap();
    assert_eq!(entertainment.rewards_done, 1);
    assert_eq!(entertainment.reward_completion_percent, 50);

    let month = aggregates
        .rollups(SummaryPeriod::Month, &SummaryPeriod::Month.key_for(date(3, 4)))
        .await
        .unwrap();
    assert_eq!(month.len(), 2);
}

#[tokio::test]
async fn test_today_and_disabled_categories_not_scored() {
    let (pool, updater) = seeded().await;
    let aggregates = AggregateRepository::new(pool.clone());

    let rewrite = updater.update_day(date(3, 4), date(3, 4)).await.unwrap();
    assert!(rewrite.reward_days.is_empty());
    assert!(!rewrite.slots.is_empty());

    SettingsRepository::new(pool.clone())
        .set_reward_punishment_enabled(FITNESS, false)
        .await
        .unwrap();
    updater.update_day(date(3, 4), date(3, 6)).await.unwrap();
    let records = aggregates
        .reward_days_between(date(3, 4), date(3, 4))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category_id, ENTERTAINMENT);
}

#[tokio::test]
async fn test_overlapping_sessions_capped_per_slot() {
    let pool = store(utc(2024, 2, 1, 8, 0)).await;
    let offset = offset_hours(0);
    let recorder = UsageRecorder::new(pool.clone(), offset);
    for package in ["com.example.a", "com.example.b"] {
        recorder
            .assign_category(package, ENTERTAINMENT)
            .await
            .unwrap();
        recorder
            .record(package, utc(2024, 3, 4, 10, 0), utc(2024, 3, 4, 11, 0))
            .await
            .unwrap();
    }

    let rewrite = UnifiedUpdateService::new(pool, offset)
        .update_day(date(3, 4), date(3, 5))
        .await
        .unwrap();
    assert_eq!(rewrite.slots.len(), 1);
    assert_eq!(rewrite.slots[0].duration_seconds, 3600);
}

#[tokio::test]
async fn test_local_midnight_split() {
    let pool = store(utc(2024, 2, 1, 8, 0)).await;
    let offset = offset_hours(8);
    let recorder = UsageRecorder::new(pool.clone(), offset);
    recorder
        .assign_category("com.example.video", ENTERTAINMENT)
        .await
        .unwrap();

    // 23:30 to 00:30 local time
    let start = utc(2024, 3, 4, 15, 30);
    let dates = recorder
        .record("com.example.video", start, start + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(dates, vec![date(3, 4), date(3, 5)]);

    let updater = UnifiedUpdateService::new(pool, offset);
    let first = updater.update_day(date(3, 4), date(3, 6)).await.unwrap();
    let second = updater.update_day(date(3, 5), date(3, 6)).await.unwrap();
    assert_eq!(first.slots.len(), 1);
    assert_eq!(first.slots[0].slot_index, 23);
    assert_eq!(first.slots[0].duration_seconds, 1800);
    assert_eq!(second.slots[0].slot_index, 0);
    assert_eq!(second.slots[0].duration_seconds, 1800);
}

#[tokio::test]
async fn test_catch_up_scores_finished_days() {
    let (pool, updater) = seeded().await;
    let aggregates = AggregateRepository::new(pool.clone());
    let settings = SettingsRepository::new(pool);

    // First pass starts at install and cannot score Monday yet
    let days = updater.catch_up(utc(2024, 3, 4, 20, 0)).await.unwrap();
    assert_eq!(days, 33);
    assert!(aggregates
        .reward_days_between(date(3, 4), date(3, 4))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(settings.last_rollover().await.unwrap(), Some(date(3, 4)));

    // After midnight Monday is revisited and scored
    let days = updater.catch_up(utc(2024, 3, 5, 0, 10)).await.unwrap();
    assert_eq!(days, 2);
    assert_eq!(
        aggregates
            .reward_days_between(date(3, 4), date(3, 4))
            .await
            .unwrap()
            .len(),
        2
    );

    let days = updater.catch_up(utc(2024, 3, 5, 9, 0)).await.unwrap();
    assert_eq!(days, 1);
}

#[derive(Default)]
struct Inbox(Mutex<Vec<(String, String)>>);

#[async_trait]
impl Notifier for Inbox {
    async fn notify(&self, title: &str, body: &str) -> offtimes_tracker::Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_reminder_for_previous_day() {
    let pool = store(utc(2024, 3, 1, 8, 0)).await;
    let offset = offset_hours(0);
    let recorder = UsageRecorder::new(pool.clone(), offset);
    recorder
        .assign_category("com.example.video", ENTERTAINMENT)
        .await
        .unwrap();
    GoalRepository::new(pool.clone())
        .upsert(&goal(ENTERTAINMENT, 60, GoalCondition::LessOrEqual))
        .await
        .unwrap();

    // Recorded and aggregated while the day is still running
    let dates = recorder
        .record("com.example.video", utc(2024, 3, 4, 10, 0), utc(2024, 3, 4, 12, 0))
        .await
        .unwrap();
    let updater = UnifiedUpdateService::new(pool.clone(), offset);
    for date in dates {
        updater.update_day(date, date).await.unwrap();
    }

    let inbox = Arc::new(Inbox::default());
    let reminders = ReminderScheduler::new(
        pool,
        inbox.clone(),
        vec![NaiveTime::from_hms_opt(9, 0, 0).unwrap()],
        offset,
    );
    assert!(reminders.fire(utc(2024, 3, 5, 9, 0)).await.unwrap());

    let sent = inbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Pending from 2024-03-04");
    assert_eq!(
        sent[0].1,
        "Entertainment: punishment pending: Push-ups 20 reps"
    );
}

#[tokio::test]
async fn test_excluding_aggregated_app_drops_its_usage() {
    let (pool, updater) = seeded().await;
    updater.update_day(date(3, 4), date(3, 5)).await.unwrap();
    let aggregates = AggregateRepository::new(pool.clone());
    let day_key = SummaryPeriod::Day.key_for(date(3, 4));

    let dates = UsageRecorder::new(pool.clone(), offset_hours(0))
        .set_excluded("com.example.video", true)
        .await
        .unwrap();
    assert_eq!(dates, vec![date(3, 4)]);
    updater.update_dates(dates, date(3, 5)).await.unwrap();

    let day = aggregates
        .summaries(SummaryPeriod::Day, &day_key)
        .await
        .unwrap();
    assert!(day.iter().all(|s| s.category_id != ENTERTAINMENT));
    let records = aggregates
        .reward_days_between(date(3, 4), date(3, 4))
        .await
        .unwrap();
    assert_eq!(records[0].category_id, ENTERTAINMENT);
    assert_eq!(records[0].usage_seconds, 0);
}

#[tokio::test]
async fn test_moving_app_moves_its_history() {
    let (pool, updater) = seeded().await;
    updater.update_day(date(3, 4), date(3, 5)).await.unwrap();

    let dates = UsageRecorder::new(pool.clone(), offset_hours(0))
        .assign_category("com.example.video", STUDY)
        .await
        .unwrap();
    updater.update_dates(dates, date(3, 5)).await.unwrap();

    let day = AggregateRepository::new(pool)
        .summaries(SummaryPeriod::Day, &SummaryPeriod::Day.key_for(date(3, 4)))
        .await
        .unwrap();
    let totals: Vec<(i64, i64)> = day.iter().map(|s| (s.category_id, s.total_seconds)).collect();
    assert_eq!(totals, vec![(STUDY, 2700), (FITNESS, 1800)]);
}
