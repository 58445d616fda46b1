//! Daily run times and retry backoff.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

/// First instant strictly after `now` whose local wall-clock time is `at`.
pub fn next_daily_run(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset);
    let today = local_now.date_naive().and_time(at);
    // A fixed offset maps every local time to exactly one instant.
    let candidate = today - Duration::seconds(offset.local_minus_utc() as i64);
    let candidate = DateTime::<Utc>::from_naive_utc_and_offset(candidate, Utc);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Exponential retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: std::time::Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: std::time::Duration::from_secs(30),
            factor: 2,
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based, counting the first run
    /// as attempt 0), or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<std::time::Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let multiplier = self.factor.checked_pow(attempt - 1)?;
        self.initial.checked_mul(multiplier)
    }
}
