//! Background job scheduler and job implementations.

mod auth_cleanup;
mod backup_retention;
mod pool_metrics;
mod scheduler;

pub use auth_cleanup::AuthCleanupJob;
pub use backup_retention::BackupRetentionJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
