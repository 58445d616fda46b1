//! Trial window and access rules.
//!
//! An account (or install) gets a fixed trial window. Access is granted when
//! the premium flag is set or the window is still open.

use chrono::{DateTime, Duration, Utc};

use crate::models::purchase::TrialInfo;

/// Length of the free trial.
pub const TRIAL_DAYS: i64 = 7;

/// Instant the trial ends (exclusive).
pub fn trial_end(start: DateTime<Utc>, trial_days: i64) -> DateTime<Utc> {
    start + Duration::days(trial_days)
}

/// True iff `start <= now < start + trial_days`.
pub fn is_in_trial_period(start: DateTime<Utc>, now: DateTime<Utc>, trial_days: i64) -> bool {
    start <= now && now < trial_end(start, trial_days)
}

/// Whole days left in the trial, rounding partial days up. Zero once expired.
pub fn remaining_trial_days(start: DateTime<Utc>, now: DateTime<Utc>, trial_days: i64) -> i64 {
    if !is_in_trial_period(start, now, trial_days) {
        return 0;
    }
    let left = trial_end(start, trial_days) - now;
    let day_ms = Duration::days(1).num_milliseconds();
    (left.num_milliseconds() + day_ms - 1) / day_ms
}

pub fn has_access(
    is_premium: bool,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    trial_days: i64,
) -> bool {
    is_premium || is_in_trial_period(start, now, trial_days)
}

pub fn trial_info(start: DateTime<Utc>, now: DateTime<Utc>, trial_days: i64) -> TrialInfo {
    TrialInfo {
        trial_start_time: start,
        trial_end_time: trial_end(start, trial_days),
        in_trial: is_in_trial_period(start, now, trial_days),
        remaining_trial_days: remaining_trial_days(start, now, trial_days),
    }
}
