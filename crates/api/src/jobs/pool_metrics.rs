//! Publishes connection pool gauges every few seconds.

use persistence::metrics::PoolStats;
use sqlx::SqlitePool;
use std::time::Duration;

use super::scheduler::{Job, JobFrequency};

pub struct PoolMetricsJob {
    pool: SqlitePool,
}

impl PoolMetricsJob {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Every(Duration::from_secs(10))
    }

    async fn execute(&self) -> Result<u64, String> {
        let stats = PoolStats::of(&self.pool);
        stats.publish();
        if stats.idle == 0 {
            tracing::debug!(open = stats.open, "No idle database connections");
        }
        Ok(0)
    }
}
