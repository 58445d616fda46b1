//! Domain services for OffTimes.
//!
//! Services contain business logic that operates on domain models.

pub mod aggregation;
pub mod schedule;
pub mod subscription;

pub use aggregation::{
    completion_percent, day_summaries, evaluate_day, hourly_slots, period_summaries, rollup,
    should_evaluate, split_hourly, HourSlice, UsageInterval,
};
pub use schedule::{next_daily_run, Backoff};
pub use subscription::{
    has_access, is_in_trial_period, remaining_trial_days, trial_end, trial_info, TRIAL_DAYS,
};
