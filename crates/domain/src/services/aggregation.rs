//! Usage aggregation.
//!
//! Raw sessions are split into hourly slots, slots roll up into day, week
//! and month summaries, and days are scored against the category goal:
//!
//! 1. `hourly_slots` splits intervals at local hour boundaries
//! 2. `day_summaries` / `period_summaries` total the slots
//! 3. `evaluate_day` scores one category-day against its goal
//! 4. `rollup` aggregates scored days into a week or month record
//!
//! Everything here is pure; loading and storing rows is the caller's job.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use std::collections::BTreeMap;

use crate::models::goal::{Goal, RewardPunishmentDay, RewardPunishmentRollup};
use crate::models::usage::{DailyUsage, SummaryPeriod, SummaryUsage, SLOT_SECONDS};

const HOUR_MS: i64 = SLOT_SECONDS * 1000;

/// A usage interval to be bucketed. Times are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageInterval {
    pub category_id: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub is_offline: bool,
}

/// The part of an interval that falls inside one local hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSlice {
    pub date: NaiveDate,
    pub slot_index: i32,
    pub millis: i64,
}

/// Splits `[start_ms, end_ms)` at hour boundaries of the given offset.
pub fn split_hourly(start_ms: i64, end_ms: i64, offset: FixedOffset) -> Vec<HourSlice> {
    let offset_ms = offset.local_minus_utc() as i64 * 1000;
    let mut slices = Vec::new();
    let mut cursor = start_ms;

    while cursor < end_ms {
        let local = cursor + offset_ms;
        let next_boundary = (local.div_euclid(HOUR_MS) + 1) * HOUR_MS - offset_ms;
        let piece_end = next_boundary.min(end_ms);

        let Some(local_time) = DateTime::from_timestamp_millis(local) else {
            break;
        };
        let local_time = local_time.naive_utc();
        slices.push(HourSlice {
            date: local_time.date(),
            slot_index: local_time.hour() as i32,
            millis: piece_end - cursor,
        });
        cursor = piece_end;
    }

    slices
}

/// Buckets intervals into hourly slots for `date`, each capped at one hour.
///
/// Intervals that only partly overlap `date` contribute the overlapping part.
pub fn hourly_slots(
    date: NaiveDate,
    intervals: &[UsageInterval],
    offset: FixedOffset,
) -> Vec<DailyUsage> {
    let mut buckets: BTreeMap<(i64, i32, bool), i64> = BTreeMap::new();

    for interval in intervals {
        for slice in split_hourly(interval.start_ms, interval.end_ms, offset) {
            if slice.date != date {
                continue;
            }
            *buckets
                .entry((interval.category_id, slice.slot_index, interval.is_offline))
                .or_default() += slice.millis;
        }
    }

    buckets
        .into_iter()
        .map(|((category_id, slot_index, is_offline), millis)| DailyUsage {
            date,
            category_id,
            slot_index,
            is_offline,
            duration_seconds: (millis / 1000).min(SLOT_SECONDS),
        })
        .filter(|slot| slot.duration_seconds > 0)
        .collect()
}

/// Day summaries per category, online and offline combined.
pub fn day_summaries(date: NaiveDate, slots: &[DailyUsage]) -> Vec<SummaryUsage> {
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for slot in slots.iter().filter(|s| s.date == date) {
        *totals.entry(slot.category_id).or_default() += slot.duration_seconds;
    }

    totals
        .into_iter()
        .map(|(category_id, total)| SummaryUsage {
            period: SummaryPeriod::Day,
            period_key: SummaryPeriod::Day.key_for(date),
            category_id,
            total_seconds: total,
            average_daily_seconds: total,
            day_count: 1,
        })
        .collect()
}

/// Week or month summaries for the period containing `anchor`, built from
/// the day summaries that fall inside it.
pub fn period_summaries(
    period: SummaryPeriod,
    anchor: NaiveDate,
    today: NaiveDate,
    days: &[(NaiveDate, SummaryUsage)],
) -> Vec<SummaryUsage> {
    let start = period.start_of(anchor);
    let end = period.end_of(anchor);
    let day_count = period.elapsed_days(anchor, today);

    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for (date, summary) in days {
        if *date >= start && *date <= end {
            *totals.entry(summary.category_id).or_default() += summary.total_seconds;
        }
    }

    totals
        .into_iter()
        .map(|(category_id, total)| SummaryUsage {
            period,
            period_key: period.key_for(anchor),
            category_id,
            total_seconds: total,
            average_daily_seconds: total / day_count,
            day_count,
        })
        .collect()
}

/// Whether a day should be scored: only finished days whose category has
/// reward/punishment enabled.
pub fn should_evaluate(date: NaiveDate, today: NaiveDate, enabled: bool) -> bool {
    enabled && date < today
}

/// Scores one category-day. Done flags and completion percents from an
/// earlier evaluation are carried over.
pub fn evaluate_day(
    date: NaiveDate,
    goal: &Goal,
    usage_seconds: i64,
    previous: Option<&RewardPunishmentDay>,
) -> RewardPunishmentDay {
    let goal_seconds = goal.goal_seconds();
    let mut record = RewardPunishmentDay {
        date,
        category_id: goal.category_id,
        goal_met: goal.condition.is_met(usage_seconds, goal_seconds),
        usage_seconds,
        goal_seconds,
        reward_done: false,
        punishment_done: false,
        reward_completion_percent: 0,
        punishment_completion_percent: 0,
    };
    if let Some(prev) = previous {
        record.reward_done = prev.reward_done;
        record.punishment_done = prev.punishment_done;
        record.reward_completion_percent = prev.reward_completion_percent;
        record.punishment_completion_percent = prev.punishment_completion_percent;
    }
    record
}

/// `done * 100 / due`, or zero when nothing is due.
pub fn completion_percent(done: i64, due: i64) -> i32 {
    if due <= 0 {
        return 0;
    }
    (done.min(due) * 100 / due) as i32
}

/// Rolls daily records of one category up into the period containing
/// `anchor`. Records outside the period are ignored.
pub fn rollup(
    period: SummaryPeriod,
    anchor: NaiveDate,
    category_id: i64,
    days: &[RewardPunishmentDay],
) -> RewardPunishmentRollup {
    let start = period.start_of(anchor);
    let end = period.end_of(anchor);
    let in_period = days
        .iter()
        .filter(|d| d.category_id == category_id && d.date >= start && d.date <= end);

    let mut evaluated = 0;
    let mut met = 0;
    let mut rewards_done = 0;
    let mut punishments_done = 0;
    for day in in_period {
        evaluated += 1;
        if day.goal_met {
            met += 1;
            if day.reward_done {
                rewards_done += 1;
            }
        } else if day.punishment_done {
            punishments_done += 1;
        }
    }

    let rewards_due = met;
    let punishments_due = evaluated - met;
    RewardPunishmentRollup {
        period,
        period_key: period.key_for(anchor),
        category_id,
        evaluated_days: evaluated,
        goal_met_days: met,
        rewards_due,
        rewards_done,
        punishments_due,
        punishments_done,
        reward_completion_percent: completion_percent(rewards_done, rewards_due),
        punishment_completion_percent: completion_percent(punishments_done, punishments_due),
    }
}
