//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod backup;
pub mod goal;
pub mod purchase;
pub mod settings;
pub mod sms_code;
pub mod usage;
pub mod user;

pub use backup::{BackupEntity, BackupSettingsEntity, BackupTableStatsEntity};
pub use goal::{GoalEntity, RewardPunishmentDayEntity, RewardPunishmentRollupEntity};
pub use purchase::PurchaseEntity;
pub use settings::{AccountStateEntity, AppSettingsEntity, ClientBackupSettingsEntity};
pub use sms_code::SmsCodeEntity;
pub use usage::{
    AppInfoEntity, AppSessionEntity, CategoryEntity, DailyUsageEntity, SummaryUsageEntity,
    TimerSessionEntity,
};
pub use user::{UserEntity, UserSessionEntity};
