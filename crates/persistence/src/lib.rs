//! Persistence layer for OffTimes.
//!
//! This crate contains:
//! - SQLite connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations for the server and the on-device store

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
