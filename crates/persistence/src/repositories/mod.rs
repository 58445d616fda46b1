//! Repository implementations for database operations.
//!
//! `user`, `sms_code`, `backup` and `purchase` back the server schema.
//! The rest back the on-device usage store.

pub mod aggregate;
pub mod backup;
pub mod category;
pub mod goal;
pub mod purchase;
pub mod session;
pub mod settings;
pub mod sms_code;
pub mod user;

pub use aggregate::{AggregateRepository, DayRewrite};
pub use backup::{BackupQuery, BackupRepository};
pub use category::{AppInfoRepository, CategoryRepository};
pub use goal::GoalRepository;
pub use purchase::{NewPurchase, PurchaseRepository};
pub use session::{NewAppSession, SessionRepository};
pub use settings::SettingsRepository;
pub use sms_code::SmsCodeRepository;
pub use user::{NewUser, UserRepository};
