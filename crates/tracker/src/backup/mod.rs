//! Incremental daily backup to the OffTimes server.
//!
//! `BackupManager` snapshots one day of four tables and uploads them; the
//! server's content hash turns repeated uploads into no-ops.
//! `BackupScheduler` runs the manager once a day with retries.

mod manager;
mod scheduler;

pub use manager::{BackupManager, BackupRun, SkipReason};
pub use scheduler::{BackupScheduler, RunConditions, SlotResult, StaticConditions};
