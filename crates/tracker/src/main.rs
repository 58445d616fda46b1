use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use domain::models::{GoalCondition, SummaryPeriod};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "offtimes-tracker")]
#[command(about = "OffTimes usage tracker", long_about = None)]
struct Cli {
    /// Tracker configuration file
    #[arg(short, long, default_value = "config/tracker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup and reminder schedulers until interrupted
    Run,

    /// Record a foreground interval of an app
    Record {
        #[arg(long)]
        package: String,
        #[arg(long, help = "Start time, RFC 3339")]
        start: DateTime<Utc>,
        #[arg(long, help = "End time, RFC 3339")]
        end: DateTime<Utc>,
    },

    /// Recompute aggregates for a range of days (default: today)
    Update {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show usage summaries and reward/punishment rollups
    Summary {
        #[arg(long, default_value = "day")]
        period: SummaryPeriod,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    Timer {
        #[command(subcommand)]
        action: TimerAction,
    },

    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    App {
        #[command(subcommand)]
        action: AppAction,
    },

    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Mark a reward or punishment as carried out
    Done {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        category: i64,
        #[arg(long)]
        reward: bool,
        #[arg(long)]
        punishment: bool,
        #[arg(long, help = "Clear the flag instead of setting it")]
        undo: bool,
    },

    /// Turn reward/punishment tracking on or off for a category
    Toggle {
        #[arg(long)]
        category: i64,
        #[arg(long)]
        enabled: bool,
    },

    Login {
        #[arg(long, help = "Phone number or username")]
        account: String,
        #[arg(long)]
        password: String,
    },

    Logout,

    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Show trial and premium status
    Subscription,
}

#[derive(Subcommand)]
enum TimerAction {
    Start {
        #[arg(long)]
        category: i64,
        #[arg(long)]
        program: String,
    },
    Stop,
    Status,
}

#[derive(Subcommand)]
enum CategoryAction {
    List,
    Add { name: String },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum AppAction {
    List,
    SetCategory { package: String, category: i64 },
    Exclude {
        package: String,
        #[arg(long, help = "Count the app again")]
        undo: bool,
    },
}

#[derive(Subcommand)]
enum GoalAction {
    List,
    Set {
        #[arg(long)]
        category: i64,
        #[arg(long)]
        minutes: i32,
        #[arg(long, default_value = "less_or_equal")]
        condition: GoalCondition,
        #[arg(long, default_value = "")]
        reward: String,
        #[arg(long, default_value_t = 0)]
        reward_amount: i32,
        #[arg(long, default_value = "")]
        reward_unit: String,
        #[arg(long, default_value = "")]
        punishment: String,
        #[arg(long, default_value_t = 0)]
        punishment_amount: i32,
        #[arg(long, default_value = "")]
        punishment_unit: String,
    },
    Remove { category: i64 },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Back up a day now (default: yesterday)
    Now {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Status,
    Schedule {
        #[arg(long, help = "Daily time, HH:MM")]
        time: Option<String>,
        #[arg(long)]
        wifi_only: Option<bool>,
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        retention_days: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = offtimes_tracker::config::TrackerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    offtimes_tracker::logging::init_logging(&config.logging)
        .context("Failed to initialize logging")?;

    let ctx = commands::Context::open(config).await?;

    match cli.command {
        Commands::Run => commands::run(&ctx).await?,
        Commands::Record { package, start, end } => {
            commands::record(&ctx, &package, start, end).await?
        }
        Commands::Update { from, to } => commands::update(&ctx, from, to).await?,
        Commands::Summary { period, date } => commands::summary(&ctx, period, date).await?,
        Commands::Timer { action } => match action {
            TimerAction::Start { category, program } => {
                commands::timer_start(&ctx, category, &program).await?
            }
            TimerAction::Stop => commands::timer_stop(&ctx).await?,
            TimerAction::Status => commands::timer_status(&ctx).await?,
        },
        Commands::Category { action } => match action {
            CategoryAction::List => commands::category_list(&ctx).await?,
            CategoryAction::Add { name } => commands::category_add(&ctx, &name).await?,
            CategoryAction::Remove { id } => commands::category_remove(&ctx, id).await?,
        },
        Commands::App { action } => match action {
            AppAction::List => commands::app_list(&ctx).await?,
            AppAction::SetCategory { package, category } => {
                commands::app_set_category(&ctx, &package, category).await?
            }
            AppAction::Exclude { package, undo } => {
                commands::app_exclude(&ctx, &package, !undo).await?
            }
        },
        Commands::Goal { action } => match action {
            GoalAction::List => commands::goal_list(&ctx).await?,
            GoalAction::Set {
                category,
                minutes,
                condition,
                reward,
                reward_amount,
                reward_unit,
                punishment,
                punishment_amount,
                punishment_unit,
            } => {
                let goal = domain::models::Goal {
                    category_id: category,
                    daily_goal_minutes: minutes,
                    condition,
                    reward_text: reward,
                    reward_amount,
                    reward_unit,
                    punishment_text: punishment,
                    punishment_amount,
                    punishment_unit,
                    frequency: Default::default(),
                };
                commands::goal_set(&ctx, goal).await?
            }
            GoalAction::Remove { category } => commands::goal_remove(&ctx, category).await?,
        },
        Commands::Done {
            date,
            category,
            reward,
            punishment,
            undo,
        } => {
            let value = !undo;
            commands::mark_done(
                &ctx,
                date,
                category,
                reward.then_some(value),
                punishment.then_some(value),
            )
            .await?
        }
        Commands::Toggle { category, enabled } => {
            commands::toggle(&ctx, category, enabled).await?
        }
        Commands::Login { account, password } => {
            commands::login(&ctx, &account, &password).await?
        }
        Commands::Logout => commands::logout(&ctx).await?,
        Commands::Backup { action } => match action {
            BackupAction::Now { date } => commands::backup_now(&ctx, date).await?,
            BackupAction::Status => commands::backup_status(&ctx).await?,
            BackupAction::Schedule {
                time,
                wifi_only,
                enabled,
                retention_days,
            } => {
                commands::backup_schedule(&ctx, time.as_deref(), wifi_only, enabled, retention_days)
                    .await?
            }
        },
        Commands::Subscription => commands::subscription(&ctx).await?,
    }

    Ok(())
}
