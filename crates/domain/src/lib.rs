//! Domain layer for OffTimes.
//!
//! This crate contains:
//! - Domain models (User, BackupRecord, AppSession, Goal, ...)
//! - Business logic services (aggregation, trial window, scheduling)

pub mod models;
pub mod services;
