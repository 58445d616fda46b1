//! On-device side of OffTimes: the usage store, its aggregation pipeline,
//! offline timers, reminders, the trial/premium check and daily backups to
//! the OffTimes server.

pub mod backup;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod reminder;
pub mod store;
pub mod subscription;
pub mod timer;
pub mod unified_update;
pub mod usage;

pub use error::{Result, TrackerError};
