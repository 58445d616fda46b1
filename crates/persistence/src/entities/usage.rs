//! Usage store entities: categories, apps, sessions and usage aggregates.

use chrono::NaiveDate;
use domain::models::{SummaryPeriod, SummaryUsage};
use sqlx::FromRow;

/// Database row mapping for the categories table.
#[derive(Debug, Clone, FromRow)]
pub struct CategoryEntity {
    pub id: i64,
    pub name: String,
    pub sort_order: i32,
    pub is_default: bool,
}

impl From<CategoryEntity> for domain::models::Category {
    fn from(entity: CategoryEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            sort_order: entity.sort_order,
            is_default: entity.is_default,
        }
    }
}

/// Database row mapping for the app_info table.
#[derive(Debug, Clone, FromRow)]
pub struct AppInfoEntity {
    pub package_name: String,
    pub app_name: String,
    pub version_name: Option<String>,
    pub category_id: i64,
    pub is_system: bool,
    pub is_enabled: bool,
    pub is_excluded: bool,
}

impl From<AppInfoEntity> for domain::models::AppInfo {
    fn from(entity: AppInfoEntity) -> Self {
        Self {
            package_name: entity.package_name,
            app_name: entity.app_name,
            version_name: entity.version_name,
            category_id: entity.category_id,
            is_system: entity.is_system,
            is_enabled: entity.is_enabled,
            is_excluded: entity.is_excluded,
        }
    }
}

/// Database row mapping for the app_sessions table.
#[derive(Debug, Clone, FromRow)]
pub struct AppSessionEntity {
    pub id: i64,
    pub package_name: String,
    pub category_id: i64,
    pub date: NaiveDate,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_seconds: i64,
    pub is_offline: bool,
}

impl From<AppSessionEntity> for domain::models::AppSession {
    fn from(entity: AppSessionEntity) -> Self {
        Self {
            id: entity.id,
            package_name: entity.package_name,
            category_id: entity.category_id,
            date: entity.date,
            start_time: entity.start_time,
            end_time: entity.end_time,
            duration_seconds: entity.duration_seconds,
            is_offline: entity.is_offline,
        }
    }
}

/// Database row mapping for the timer_sessions table.
#[derive(Debug, Clone, FromRow)]
pub struct TimerSessionEntity {
    pub id: i64,
    pub category_id: i64,
    pub program_name: String,
    pub date: NaiveDate,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_seconds: i64,
    pub is_active: bool,
}

impl From<TimerSessionEntity> for domain::models::TimerSession {
    fn from(entity: TimerSessionEntity) -> Self {
        Self {
            id: entity.id,
            category_id: entity.category_id,
            program_name: entity.program_name,
            date: entity.date,
            start_time: entity.start_time,
            end_time: entity.end_time,
            duration_seconds: entity.duration_seconds,
            is_active: entity.is_active,
        }
    }
}

/// Database row mapping for the daily_usage table.
#[derive(Debug, Clone, FromRow)]
pub struct DailyUsageEntity {
    pub date: NaiveDate,
    pub category_id: i64,
    pub slot_index: i32,
    pub is_offline: bool,
    pub duration_seconds: i64,
}

impl From<DailyUsageEntity> for domain::models::DailyUsage {
    fn from(entity: DailyUsageEntity) -> Self {
        Self {
            date: entity.date,
            category_id: entity.category_id,
            slot_index: entity.slot_index,
            is_offline: entity.is_offline,
            duration_seconds: entity.duration_seconds,
        }
    }
}

/// Row of any of the summary_usage_{day,week,month} tables.
#[derive(Debug, Clone, FromRow)]
pub struct SummaryUsageEntity {
    pub period_key: String,
    pub category_id: i64,
    pub total_seconds: i64,
    pub average_daily_seconds: i64,
    pub day_count: i64,
}

impl SummaryUsageEntity {
    pub fn into_model(self, period: SummaryPeriod) -> SummaryUsage {
        SummaryUsage {
            period,
            period_key: self.period_key,
            category_id: self.category_id,
            total_seconds: self.total_seconds,
            average_daily_seconds: self.average_daily_seconds,
            day_count: self.day_count,
        }
    }
}
