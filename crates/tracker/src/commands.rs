use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use domain::models::{AppInfo, Category, Goal, RewardPunishmentDay, SummaryPeriod};
use offtimes_tracker::backup::{BackupManager, BackupScheduler, StaticConditions};
use offtimes_tracker::client::{Account, ApiClient};
use offtimes_tracker::config::TrackerConfig;
use offtimes_tracker::reminder::{LogNotifier, ReminderScheduler};
use offtimes_tracker::subscription::SubscriptionManager;
use offtimes_tracker::timer::TimerService;
use offtimes_tracker::unified_update::UnifiedUpdateService;
use offtimes_tracker::usage::UsageRecorder;
use persistence::repositories::{
    AggregateRepository, AppInfoRepository, CategoryRepository, GoalRepository,
    SettingsRepository,
};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use validator::Validate;

pub struct Context {
    pub config: TrackerConfig,
    pub pool: SqlitePool,
    pub offset: FixedOffset,
}

impl Context {
    pub async fn open(config: TrackerConfig) -> Result<Self> {
        let offset = config.clock.offset()?;
        let pool = offtimes_tracker::store::open(&config.store.path, Utc::now())
            .await
            .context("Failed to open usage store")?;
        Ok(Self {
            config,
            pool,
            offset,
        })
    }

    fn account(&self) -> Result<Account> {
        let client = ApiClient::new(
            &self.config.server.base_url,
            self.config.server.request_timeout(),
        )?;
        Ok(Account::new(client, SettingsRepository::new(self.pool.clone())))
    }

    fn updater(&self) -> UnifiedUpdateService {
        UnifiedUpdateService::new(self.pool.clone(), self.offset)
    }

    fn today(&self) -> NaiveDate {
        self.updater().today(Utc::now())
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(ctx: &Context) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = vec![ctx.updater().spawn_daily(shutdown_rx.clone())];

    let manager = Arc::new(BackupManager::new(
        ctx.pool.clone(),
        ctx.account()?,
        ctx.offset,
    ));
    let backups = BackupScheduler::new(
        manager,
        SettingsRepository::new(ctx.pool.clone()),
        Arc::new(StaticConditions(ctx.config.device.clone())),
        ctx.config.backup.backoff(),
        ctx.offset,
    );
    handles.push(backups.spawn(shutdown_rx.clone()));

    if ctx.config.reminder.enabled {
        let reminders = ReminderScheduler::new(
            ctx.pool.clone(),
            Arc::new(LogNotifier),
            ctx.config.reminder.parsed_times()?,
            ctx.offset,
        );
        handles.push(reminders.spawn(shutdown_rx));
    }

    info!("Tracker running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .is_err()
    {
        warn!("Schedulers did not stop within 10s");
    }
    Ok(())
}

pub async fn record(
    ctx: &Context,
    package: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    let dates = UsageRecorder::new(ctx.pool.clone(), ctx.offset)
        .record(package, start, end)
        .await?;
    let today = ctx.today();
    for date in &dates {
        ctx.updater().update_day(*date, today).await?;
    }
    print(&json!({ "recorded": !dates.is_empty(), "datesUpdated": dates }))
}

/// Without a range, bring every day since the last pass up to date.
pub async fn update(ctx: &Context, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let Some(from) = from else {
        let days = ctx.updater().catch_up(Utc::now()).await?;
        return print(&json!({ "to": ctx.today(), "days": days }));
    };
    let today = ctx.today();
    let to = to.unwrap_or(from.max(today));
    let days = ctx.updater().update_range(from, to, today).await?;
    print(&json!({ "from": from, "to": to, "days": days }))
}

pub async fn summary(ctx: &Context, period: SummaryPeriod, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| ctx.today());
    let key = period.key_for(date);
    let aggregates = AggregateRepository::new(ctx.pool.clone());

    let usage = aggregates.summaries(period, &key).await?;
    let report = match period {
        SummaryPeriod::Day => {
            let records: Vec<RewardPunishmentDay> = aggregates
                .reward_days_between(date, date)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
            json!({ "periodKey": key, "usage": usage, "rewardPunishment": records })
        }
        _ => {
            let rollups = aggregates.rollups(period, &key).await?;
            json!({ "periodKey": key, "usage": usage, "rewardPunishment": rollups })
        }
    };
    print(&report)
}

pub async fn timer_start(ctx: &Context, category: i64, program: &str) -> Result<()> {
    let started = TimerService::new(ctx.pool.clone(), ctx.offset)
        .start(category, program, Utc::now())
        .await?;
    print(&started)
}

pub async fn timer_stop(ctx: &Context) -> Result<()> {
    let stopped = TimerService::new(ctx.pool.clone(), ctx.offset)
        .stop(Utc::now())
        .await?;
    // The timer may have crossed midnight
    let today = ctx.today();
    let updater = ctx.updater();
    for date in stopped.date.iter_days().take_while(|d| *d <= today) {
        updater.update_day(date, today).await?;
    }
    print(&stopped)
}

pub async fn timer_status(ctx: &Context) -> Result<()> {
    let active = TimerService::new(ctx.pool.clone(), ctx.offset)
        .active(Utc::now())
        .await?;
    print(&active)
}

pub async fn category_list(ctx: &Context) -> Result<()> {
    let categories: Vec<Category> = CategoryRepository::new(ctx.pool.clone())
        .list()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    print(&categories)
}

pub async fn category_add(ctx: &Context, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name is required");
    }
    let created: Category = CategoryRepository::new(ctx.pool.clone())
        .create(name)
        .await?
        .into();
    print(&created)
}

pub async fn category_remove(ctx: &Context, id: i64) -> Result<()> {
    let categories = CategoryRepository::new(ctx.pool.clone());
    match categories.find_by_id(id).await? {
        None => bail!("Unknown category: {}", id),
        Some(c) if c.is_default => bail!("Built-in category {} cannot be removed", c.name),
        Some(_) => {}
    }
    let settings = SettingsRepository::new(ctx.pool.clone()).app_settings().await?;
    if settings.default_category_id == id {
        bail!("Category {} is the default for new apps", id);
    }
    let removed = categories.delete(id).await?;
    print(&json!({ "removed": removed }))
}

pub async fn app_list(ctx: &Context) -> Result<()> {
    let apps: Vec<AppInfo> = AppInfoRepository::new(ctx.pool.clone())
        .list()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    print(&apps)
}

pub async fn app_set_category(ctx: &Context, package: &str, category: i64) -> Result<()> {
    let dates = UsageRecorder::new(ctx.pool.clone(), ctx.offset)
        .assign_category(package, category)
        .await?;
    let days = ctx.updater().update_dates(dates, ctx.today()).await?;
    print(&json!({ "packageName": package, "categoryId": category, "daysUpdated": days }))
}

pub async fn app_exclude(ctx: &Context, package: &str, excluded: bool) -> Result<()> {
    let dates = UsageRecorder::new(ctx.pool.clone(), ctx.offset)
        .set_excluded(package, excluded)
        .await?;
    let days = ctx.updater().update_dates(dates, ctx.today()).await?;
    print(&json!({ "packageName": package, "excluded": excluded, "daysUpdated": days }))
}

pub async fn goal_list(ctx: &Context) -> Result<()> {
    let goals: Vec<Goal> = GoalRepository::new(ctx.pool.clone())
        .list()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    print(&goals)
}

pub async fn goal_set(ctx: &Context, goal: Goal) -> Result<()> {
    goal.validate()?;
    if CategoryRepository::new(ctx.pool.clone())
        .find_by_id(goal.category_id)
        .await?
        .is_none()
    {
        bail!("Unknown category: {}", goal.category_id);
    }
    let saved: Goal = GoalRepository::new(ctx.pool.clone())
        .upsert(&goal)
        .await?
        .into();
    ctx.updater().rebuild(Utc::now()).await?;
    print(&saved)
}

pub async fn goal_remove(ctx: &Context, category: i64) -> Result<()> {
    let removed = GoalRepository::new(ctx.pool.clone()).delete(category).await?;
    if removed {
        ctx.updater().rebuild(Utc::now()).await?;
    }
    print(&json!({ "removed": removed }))
}

pub async fn mark_done(
    ctx: &Context,
    date: NaiveDate,
    category: i64,
    reward: Option<bool>,
    punishment: Option<bool>,
) -> Result<()> {
    if reward.is_none() && punishment.is_none() {
        bail!("Pass --reward and/or --punishment");
    }
    let updated = AggregateRepository::new(ctx.pool.clone())
        .mark_done(date, category, reward, punishment)
        .await?;
    if !updated {
        bail!("No reward/punishment record for category {} on {}", category, date);
    }
    // Rollups read the flags
    ctx.updater().update_day(date, ctx.today()).await?;
    print(&json!({ "date": date, "categoryId": category, "updated": true }))
}

pub async fn toggle(ctx: &Context, category: i64, enabled: bool) -> Result<()> {
    SettingsRepository::new(ctx.pool.clone())
        .set_reward_punishment_enabled(category, enabled)
        .await?;
    ctx.updater().rebuild(Utc::now()).await?;
    print(&json!({ "categoryId": category, "enabled": enabled }))
}

pub async fn login(ctx: &Context, account: &str, password: &str) -> Result<()> {
    let user_id = ctx.account()?.sign_in(account, password).await?;
    print(&json!({ "userId": user_id }))
}

pub async fn logout(ctx: &Context) -> Result<()> {
    ctx.account()?.sign_out().await?;
    print(&json!({ "signedOut": true }))
}

pub async fn backup_now(ctx: &Context, date: Option<NaiveDate>) -> Result<()> {
    let manager = BackupManager::new(ctx.pool.clone(), ctx.account()?, ctx.offset);
    let now = Utc::now();
    let date = date.unwrap_or_else(|| manager.backup_date(now));
    let run = manager.run_for(date, now).await?;
    print(&json!({ "date": date, "result": format!("{:?}", run) }))
}

pub async fn backup_status(ctx: &Context) -> Result<()> {
    let settings = SettingsRepository::new(ctx.pool.clone())
        .backup_settings()
        .await?;
    print(&settings)
}

pub async fn backup_schedule(
    ctx: &Context,
    time: Option<&str>,
    wifi_only: Option<bool>,
    enabled: Option<bool>,
    retention_days: Option<i32>,
) -> Result<()> {
    let repo = SettingsRepository::new(ctx.pool.clone());
    let mut settings = repo.backup_settings().await?;
    if let Some(time) = time {
        let Some(at) = shared::validation::parse_time_of_day(time) else {
            bail!("Time must be formatted as HH:MM");
        };
        settings.backup_hour = at.hour();
        settings.backup_minute = at.minute();
    }
    if let Some(wifi_only) = wifi_only {
        settings.wifi_only = wifi_only;
    }
    if let Some(enabled) = enabled {
        settings.enabled = enabled;
    }
    if let Some(days) = retention_days {
        if !(1..=3650).contains(&days) {
            bail!("Retention must be 1-3650 days");
        }
        settings.retention_days = days;
    }
    repo.save_backup_schedule(&settings).await?;
    print(&settings)
}

pub async fn subscription(ctx: &Context) -> Result<()> {
    let manager = SubscriptionManager::new(
        SettingsRepository::new(ctx.pool.clone()),
        ctx.account()?,
        ctx.config.trial_days,
    );
    let state = manager.check(Utc::now()).await?;
    print(&state)
}
