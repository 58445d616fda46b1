//! Domain models for OffTimes.

pub mod backup;
pub mod goal;
pub mod purchase;
pub mod settings;
pub mod sms;
pub mod usage;
pub mod user;

pub use backup::{
    BackupPreferences, BackupRecord, BackupTable, BackupTableInfo, BackupUploadRequest,
    BackupUploadResult, UpdateBackupSettingsRequest,
};
pub use goal::{Goal, GoalCondition, GoalFrequency, RewardPunishmentDay, RewardPunishmentRollup};
pub use purchase::{
    PaymentConfigStatus, PaymentPlatform, PurchaseRecord, PurchaseStatusResponse,
    RestorePurchasesRequest, TrialInfo, VerifyPurchaseRequest,
};
pub use settings::{AccountState, AppSettings, BackupOutcome, ClientBackupSettings};
pub use sms::{SmsCode, SmsPurpose};
pub use usage::{
    AppInfo, AppSession, Category, DailyUsage, SummaryPeriod, SummaryUsage, TimerSession,
};
pub use user::{LoginProvider, SubscriptionStatus, User, UserSession};
