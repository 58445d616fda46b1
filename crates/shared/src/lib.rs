//! Shared utilities for the OffTimes workspace.
//!
//! - Hashing helpers (SHA-256, canonical JSON content hashes, one-time codes)
//! - JWT issuing and validation
//! - Password hashing with Argon2id and the account password policy
//! - Validators for request fields

pub mod crypto;
pub mod jwt;
pub mod password;
pub mod validation;
