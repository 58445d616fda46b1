//! Daily reminders about rewards and punishments left to carry out.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use domain::models::{Goal, RewardPunishmentDay};
use domain::services::next_daily_run;
use persistence::repositories::{AggregateRepository, CategoryRepository, GoalRepository};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;
use crate::unified_update::UnifiedUpdateService;

/// Delivers a reminder to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Writes reminders to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "Reminder");
        Ok(())
    }
}

fn describe(text: &str, amount: i32, unit: &str) -> String {
    match (text.is_empty(), amount > 0) {
        (true, _) => String::new(),
        (false, true) => format!(": {} {} {}", text, amount, unit).trim_end().to_string(),
        (false, false) => format!(": {}", text),
    }
}

/// One line per pending reward or punishment, or `None` when all are done.
pub fn pending_message(
    days: &[RewardPunishmentDay],
    categories: &HashMap<i64, String>,
    goals: &HashMap<i64, Goal>,
) -> Option<String> {
    let mut lines = Vec::new();
    for day in days {
        let name = categories
            .get(&day.category_id)
            .map(String::as_str)
            .unwrap_or("Unknown category");
        let goal = goals.get(&day.category_id);
        if day.reward_pending() {
            let detail = goal
                .map(|g| describe(&g.reward_text, g.reward_amount, &g.reward_unit))
                .unwrap_or_default();
            lines.push(format!("{}: reward pending{}", name, detail));
        }
        if day.punishment_pending() {
            let detail = goal
                .map(|g| describe(&g.punishment_text, g.punishment_amount, &g.punishment_unit))
                .unwrap_or_default();
            lines.push(format!("{}: punishment pending{}", name, detail));
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// First instant after `now` matching any of the daily `times`.
pub fn next_fire(
    now: DateTime<Utc>,
    times: &[NaiveTime],
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    times.iter().map(|t| next_daily_run(now, *t, offset)).min()
}

pub struct ReminderScheduler {
    aggregates: AggregateRepository,
    categories: CategoryRepository,
    goals: GoalRepository,
    updater: UnifiedUpdateService,
    notifier: Arc<dyn Notifier>,
    times: Vec<NaiveTime>,
    offset: FixedOffset,
}

impl ReminderScheduler {
    pub fn new(
        pool: SqlitePool,
        notifier: Arc<dyn Notifier>,
        times: Vec<NaiveTime>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            aggregates: AggregateRepository::new(pool.clone()),
            categories: CategoryRepository::new(pool.clone()),
            goals: GoalRepository::new(pool.clone()),
            updater: UnifiedUpdateService::new(pool, offset),
            notifier,
            times,
            offset,
        }
    }

    fn yesterday(&self, now: DateTime<Utc>) -> NaiveDate {
        (now.with_timezone(&self.offset) - Duration::days(1)).date_naive()
    }

    /// Build yesterday's reminder and send it. Returns whether anything was sent.
    pub async fn fire(&self, now: DateTime<Utc>) -> Result<bool> {
        // Yesterday has no scores until a pass runs after it ended
        self.updater.catch_up(now).await?;
        let date = self.yesterday(now);
        let days: Vec<RewardPunishmentDay> = self
            .aggregates
            .reward_days_between(date, date)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let categories: HashMap<i64, String> = self
            .categories
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let goals: HashMap<i64, Goal> = self
            .goals
            .list()
            .await?
            .into_iter()
            .map(|g| (g.category_id, Goal::from(g)))
            .collect();

        let Some(body) = pending_message(&days, &categories, &goals) else {
            return Ok(false);
        };
        let title = format!("Pending from {}", date);
        self.notifier.notify(&title, &body).await?;
        Ok(true)
    }

    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = next_fire(now, &self.times, self.offset) else {
                    info!("No reminder times configured");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = self.fire(Utc::now()).await {
                            error!(error = %e, "Reminder failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Reminder scheduler stopped");
        })
    }
}
