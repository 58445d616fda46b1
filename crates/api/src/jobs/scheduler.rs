//! Runs server housekeeping jobs on intervals or at a daily UTC time.

use chrono::{DateTime, NaiveTime, Offset, Utc};
use domain::services::next_daily_run;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Fixed period, first run one period after start.
    Every(Duration),
    /// Once a day at this UTC wall-clock time.
    DailyAt(NaiveTime),
}

impl JobFrequency {
    /// Time to wait from `now` until the next run.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            JobFrequency::Every(period) => *period,
            JobFrequency::DailyAt(at) => (next_daily_run(now, *at, Utc.fix()) - now)
                .to_std()
                .unwrap_or_default(),
        }
    }
}

/// Background work. `execute` returns how many records it touched.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn frequency(&self) -> JobFrequency;

    async fn execute(&self) -> Result<u64, String>;
}

/// Owns one task per registered job and stops them together.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    pub fn start(&mut self) {
        info!(jobs = ?self.job_names(), "Starting housekeeping jobs");
        for job in &self.jobs {
            let rx = self.shutdown_tx.subscribe();
            self.handles.push(tokio::spawn(run_job(Arc::clone(job), rx)));
        }
    }

    /// Stop every job and wait up to `timeout` for runs in flight.
    pub async fn stop(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let drain = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(?timeout, "Housekeeping jobs did not stop in time");
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Arc<dyn Job>, mut shutdown_rx: watch::Receiver<bool>) {
    let name = job.name();
    loop {
        let delay = job.frequency().delay_from(Utc::now());
        debug!(job = name, delay_secs = delay.as_secs(), "Job waiting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let started = Instant::now();
        let result = job.execute().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("offtimes_jobs_total", "job" => name, "outcome" => outcome)
            .increment(1);
        match result {
            Ok(0) => debug!(job = name, elapsed_ms, "Job found nothing to do"),
            Ok(affected) => info!(job = name, elapsed_ms, affected, "Job completed"),
            Err(e) => error!(job = name, elapsed_ms, error = %e, "Job failed"),
        }
    }
    info!(job = name, "Job stopped");
}
