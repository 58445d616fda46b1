//! HTTP route handlers.

pub mod auth;
pub mod backup;
pub mod health;
pub mod purchase;
pub mod user;
