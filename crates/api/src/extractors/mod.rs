//! Request extractors.

pub mod user_auth;
