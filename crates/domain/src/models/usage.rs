//! Usage tracking models: categories, apps, sessions and derived usage tables.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one hourly usage slot.
pub const SLOT_SECONDS: i64 = 3600;

/// Hourly slots per day.
pub const SLOTS_PER_DAY: i32 = 24;

/// Categories created on first run, in display order.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["Entertainment", "Study", "Fitness", "Work", "Other"];

/// Bucket that app usage and offline timers roll up into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub sort_order: i32,
    pub is_default: bool,
}

/// An installed application and its category assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub package_name: String,
    pub app_name: String,
    pub version_name: Option<String>,
    pub category_id: i64,
    pub is_system: bool,
    pub is_enabled: bool,
    /// Excluded apps are never counted in statistics.
    pub is_excluded: bool,
}

/// One foreground interval of an app. Times are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSession {
    pub id: i64,
    pub package_name: String,
    pub category_id: i64,
    pub date: NaiveDate,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_seconds: i64,
    pub is_offline: bool,
}

/// A manually started offline activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub id: i64,
    pub category_id: i64,
    pub program_name: String,
    pub date: NaiveDate,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_seconds: i64,
    pub is_active: bool,
}

impl TimerSession {
    /// Seconds elapsed at `now_ms` for a running timer, or the stored duration.
    pub fn elapsed_seconds(&self, now_ms: i64) -> i64 {
        match self.end_time {
            Some(_) => self.duration_seconds,
            None => ((now_ms - self.start_time) / 1000).max(0),
        }
    }
}

/// Usage within one hour of one day for one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub category_id: i64,
    pub slot_index: i32,
    pub is_offline: bool,
    pub duration_seconds: i64,
}

/// Granularity of a summary or rollup row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    Day,
    Week,
    Month,
}

impl SummaryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryPeriod::Day => "day",
            SummaryPeriod::Week => "week",
            SummaryPeriod::Month => "month",
        }
    }

    /// First date of the period containing `date`. Weeks start on Monday.
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            SummaryPeriod::Day => date,
            SummaryPeriod::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            SummaryPeriod::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Last date of the period containing `date`.
    pub fn end_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            SummaryPeriod::Day => date,
            SummaryPeriod::Week => self.start_of(date) + Duration::days(6),
            SummaryPeriod::Month => {
                let (y, m) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(y, m, 1)
                    .map(|next| next - Duration::days(1))
                    .unwrap_or(date)
            }
        }
    }

    /// Key identifying the period: the date, the week's Monday, or `YYYY-MM`.
    pub fn key_for(&self, date: NaiveDate) -> String {
        match self {
            SummaryPeriod::Day => date.format("%Y-%m-%d").to_string(),
            SummaryPeriod::Week => self.start_of(date).format("%Y-%m-%d").to_string(),
            SummaryPeriod::Month => date.format("%Y-%m").to_string(),
        }
    }

    /// Every date in the period containing `date`.
    pub fn dates(&self, date: NaiveDate) -> Vec<NaiveDate> {
        let start = self.start_of(date);
        let end = self.end_of(date);
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .collect()
    }

    /// Days of the period containing `date` that have started by `today`,
    /// never less than one.
    pub fn elapsed_days(&self, date: NaiveDate, today: NaiveDate) -> i64 {
        let start = self.start_of(date);
        let end = self.end_of(date);
        let last = today.min(end);
        ((last - start).num_days() + 1).max(1)
    }
}

impl FromStr for SummaryPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(SummaryPeriod::Day),
            "week" => Ok(SummaryPeriod::Week),
            "month" => Ok(SummaryPeriod::Month),
            _ => Err(format!("Invalid summary period: {}", s)),
        }
    }
}

impl fmt::Display for SummaryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Total usage of a category over a day, week or month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryUsage {
    pub period: SummaryPeriod,
    pub period_key: String,
    pub category_id: i64,
    pub total_seconds: i64,
    pub average_daily_seconds: i64,
    pub day_count: i64,
}
