//! Query latency and pool gauges, exported through the `metrics` facade.
//!
//! Both the server and the tracker link this crate; without an installed
//! recorder the calls are no-ops.

use metrics::{gauge, histogram};
use sqlx::SqlitePool;
use std::time::Instant;

const QUERY_SECONDS: &str = "offtimes_db_query_seconds";

/// Times one repository call. Create it before the query and call
/// `record` once the result is in.
#[must_use = "call record() after the query"]
pub struct QueryTimer {
    query: &'static str,
    started: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            started: Instant::now(),
        }
    }

    pub fn record(self) {
        histogram!(QUERY_SECONDS, "query" => self.query)
            .record(self.started.elapsed().as_secs_f64());
    }
}

/// Connection counts of a pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub open: u32,
    pub idle: u32,
}

impl PoolStats {
    pub fn of(pool: &SqlitePool) -> Self {
        Self {
            open: pool.size(),
            idle: pool.num_idle() as u32,
        }
    }

    pub fn in_use(&self) -> u32 {
        self.open.saturating_sub(self.idle)
    }

    pub fn publish(&self) {
        gauge!("offtimes_db_connections", "state" => "in_use").set(self.in_use() as f64);
        gauge!("offtimes_db_connections", "state" => "idle").set(self.idle as f64);
    }
}
