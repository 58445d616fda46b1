//! Business services behind the HTTP handlers.

pub mod auth;
pub mod backup;
pub mod purchase;
pub mod sms;

pub use auth::{AuthError, AuthResult, AuthService, TokenPair, VendorProfile};
pub use backup::{BackupError, BackupService, DownloadFilter};
pub use purchase::{PurchaseError, PurchaseService};
pub use sms::{sender_for, ConsoleSmsSender, SmsError, SmsSender, SmsService};
