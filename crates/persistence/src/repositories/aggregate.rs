//! Derived usage tables: hourly slots, summaries and reward/punishment records.

use chrono::NaiveDate;
use domain::models::{
    DailyUsage, RewardPunishmentDay, RewardPunishmentRollup, SummaryPeriod, SummaryUsage,
};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::entities::{
    DailyUsageEntity, RewardPunishmentDayEntity, RewardPunishmentRollupEntity, SummaryUsageEntity,
};
use crate::metrics::QueryTimer;

fn summary_table(period: SummaryPeriod) -> &'static str {
    match period {
        SummaryPeriod::Day => "summary_usage_day",
        SummaryPeriod::Week => "summary_usage_week",
        SummaryPeriod::Month => "summary_usage_month",
    }
}

fn rollup_table(period: SummaryPeriod) -> Option<&'static str> {
    match period {
        SummaryPeriod::Day => None,
        SummaryPeriod::Week => Some("reward_punishment_week"),
        SummaryPeriod::Month => Some("reward_punishment_month"),
    }
}

const RP_DAY_COLUMNS: &str = r#"
    date, category_id, goal_met, usage_seconds, goal_seconds, reward_done, punishment_done,
    reward_completion_percent, punishment_completion_percent
"#;

/// Everything derived for one date, written atomically.
///
/// Existing rows for the date (and for the week and month containing it)
/// are replaced by the rows given here.
#[derive(Debug, Clone)]
pub struct DayRewrite {
    pub date: NaiveDate,
    pub slots: Vec<DailyUsage>,
    pub day_summaries: Vec<SummaryUsage>,
    pub week_summaries: Vec<SummaryUsage>,
    pub month_summaries: Vec<SummaryUsage>,
    pub reward_days: Vec<RewardPunishmentDay>,
    pub week_rollups: Vec<RewardPunishmentRollup>,
    pub month_rollups: Vec<RewardPunishmentRollup>,
}

/// Repository for aggregated usage.
#[derive(Clone)]
pub struct AggregateRepository {
    pool: SqlitePool,
}

impl AggregateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace all derived rows of `rewrite.date` in one transaction.
    pub async fn apply_day(&self, rewrite: &DayRewrite) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("apply_day_rewrite");
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM daily_usage WHERE date = ?1")
            .bind(rewrite.date)
            .execute(&mut *tx)
            .await?;
        for slot in &rewrite.slots {
            sqlx::query(
                r#"
                INSERT INTO daily_usage (date, category_id, slot_index, is_offline, duration_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(slot.date)
            .bind(slot.category_id)
            .bind(slot.slot_index)
            .bind(slot.is_offline)
            .bind(slot.duration_seconds)
            .execute(&mut *tx)
            .await?;
        }

        for (period, rows) in [
            (SummaryPeriod::Day, &rewrite.day_summaries),
            (SummaryPeriod::Week, &rewrite.week_summaries),
            (SummaryPeriod::Month, &rewrite.month_summaries),
        ] {
            replace_summaries(&mut tx, period, &period.key_for(rewrite.date), rows).await?;
        }

        sqlx::query("DELETE FROM reward_punishment_day WHERE date = ?1")
            .bind(rewrite.date)
            .execute(&mut *tx)
            .await?;
        for day in &rewrite.reward_days {
            insert_reward_day(&mut tx, day).await?;
        }

        for (period, rows) in [
            (SummaryPeriod::Week, &rewrite.week_rollups),
            (SummaryPeriod::Month, &rewrite.month_rollups),
        ] {
            replace_rollups(&mut tx, period, &period.key_for(rewrite.date), rows).await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(())
    }

    pub async fn daily_usage(&self, date: NaiveDate) -> Result<Vec<DailyUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("daily_usage_for_date");
        let result = sqlx::query_as::<_, DailyUsageEntity>(
            r#"
            SELECT date, category_id, slot_index, is_offline, duration_seconds
            FROM daily_usage
            WHERE date = ?1
            ORDER BY category_id, slot_index, is_offline
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Summary rows of one period key.
    pub async fn summaries(
        &self,
        period: SummaryPeriod,
        period_key: &str,
    ) -> Result<Vec<SummaryUsage>, sqlx::Error> {
        let timer = QueryTimer::new("summaries_for_period");
        let sql = format!(
            r#"
            SELECT period_key, category_id, total_seconds, average_daily_seconds, day_count
            FROM {}
            WHERE period_key = ?1
            ORDER BY category_id
            "#,
            summary_table(period)
        );
        let result = sqlx::query_as::<_, SummaryUsageEntity>(&sql)
            .bind(period_key)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result.map(|rows| rows.into_iter().map(|r| r.into_model(period)).collect())
    }

    /// Day summaries with dates in `[from, to]`.
    pub async fn day_summaries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, SummaryUsage)>, sqlx::Error> {
        let timer = QueryTimer::new("day_summaries_between");
        let result = sqlx::query_as::<_, SummaryUsageEntity>(
            r#"
            SELECT period_key, category_id, total_seconds, average_daily_seconds, day_count
            FROM summary_usage_day
            WHERE period_key >= ?1 AND period_key <= ?2
            ORDER BY period_key, category_id
            "#,
        )
        .bind(SummaryPeriod::Day.key_for(from))
        .bind(SummaryPeriod::Day.key_for(to))
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result?
            .into_iter()
            .filter_map(|row| {
                let date = NaiveDate::parse_from_str(&row.period_key, "%Y-%m-%d").ok()?;
                Some((date, row.into_model(SummaryPeriod::Day)))
            })
            .collect())
    }

    pub async fn reward_days_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RewardPunishmentDayEntity>, sqlx::Error> {
        let timer = QueryTimer::new("reward_days_between");
        let sql = format!(
            "SELECT {} FROM reward_punishment_day WHERE date >= ?1 AND date <= ?2 ORDER BY date, category_id",
            RP_DAY_COLUMNS
        );
        let result = sqlx::query_as::<_, RewardPunishmentDayEntity>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn rollups(
        &self,
        period: SummaryPeriod,
        period_key: &str,
    ) -> Result<Vec<RewardPunishmentRollup>, sqlx::Error> {
        let Some(table) = rollup_table(period) else {
            return Ok(Vec::new());
        };
        let timer = QueryTimer::new("rollups_for_period");
        let sql = format!(
            r#"
            SELECT period_key, category_id, evaluated_days, goal_met_days, rewards_due,
                   rewards_done, punishments_due, punishments_done,
                   reward_completion_percent, punishment_completion_percent
            FROM {}
            WHERE period_key = ?1
            ORDER BY category_id
            "#,
            table
        );
        let result = sqlx::query_as::<_, RewardPunishmentRollupEntity>(&sql)
            .bind(period_key)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result.map(|rows| rows.into_iter().map(|r| r.into_model(period)).collect())
    }

    /// Record that the user carried out a reward or punishment.
    ///
    /// Returns false if there is no record for the date and category.
    pub async fn mark_done(
        &self,
        date: NaiveDate,
        category_id: i64,
        reward_done: Option<bool>,
        punishment_done: Option<bool>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_reward_punishment_done");
        let result = sqlx::query(
            r#"
            UPDATE reward_punishment_day
            SET reward_done = COALESCE(?1, reward_done),
                punishment_done = COALESCE(?2, punishment_done),
                reward_completion_percent =
                    CASE WHEN COALESCE(?1, reward_done) THEN 100 ELSE 0 END,
                punishment_completion_percent =
                    CASE WHEN COALESCE(?2, punishment_done) THEN 100 ELSE 0 END
            WHERE date = ?3 AND category_id = ?4
            "#,
        )
        .bind(reward_done)
        .bind(punishment_done)
        .bind(date)
        .bind(category_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

async fn replace_summaries(
    tx: &mut Transaction<'_, Sqlite>,
    period: SummaryPeriod,
    period_key: &str,
    rows: &[SummaryUsage],
) -> Result<(), sqlx::Error> {
    let table = summary_table(period);
    sqlx::query(&format!("DELETE FROM {} WHERE period_key = ?1", table))
        .bind(period_key)
        .execute(&mut **tx)
        .await?;
    let insert = format!(
        r#"
        INSERT INTO {} (period_key, category_id, total_seconds, average_daily_seconds, day_count)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        table
    );
    for row in rows {
        sqlx::query(&insert)
            .bind(&row.period_key)
            .bind(row.category_id)
            .bind(row.total_seconds)
            .bind(row.average_daily_seconds)
            .bind(row.day_count)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_reward_day(
    tx: &mut Transaction<'_, Sqlite>,
    day: &RewardPunishmentDay,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO reward_punishment_day ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        RP_DAY_COLUMNS
    ))
    .bind(day.date)
    .bind(day.category_id)
    .bind(day.goal_met)
    .bind(day.usage_seconds)
    .bind(day.goal_seconds)
    .bind(day.reward_done)
    .bind(day.punishment_done)
    .bind(day.reward_completion_percent)
    .bind(day.punishment_completion_percent)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_rollups(
    tx: &mut Transaction<'_, Sqlite>,
    period: SummaryPeriod,
    period_key: &str,
    rows: &[RewardPunishmentRollup],
) -> Result<(), sqlx::Error> {
    let Some(table) = rollup_table(period) else {
        return Ok(());
    };
    sqlx::query(&format!("DELETE FROM {} WHERE period_key = ?1", table))
        .bind(period_key)
        .execute(&mut **tx)
        .await?;
    let insert = format!(
        r#"
        INSERT INTO {} (period_key, category_id, evaluated_days, goal_met_days, rewards_due,
                        rewards_done, punishments_due, punishments_done,
                        reward_completion_percent, punishment_completion_percent)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        table
    );
    for row in rows {
        sqlx::query(&insert)
            .bind(&row.period_key)
            .bind(row.category_id)
            .bind(row.evaluated_days)
            .bind(row.goal_met_days)
            .bind(row.rewards_due)
            .bind(row.rewards_done)
            .bind(row.punishments_due)
            .bind(row.punishments_done)
            .bind(row.reward_completion_percent)
            .bind(row.punishment_completion_percent)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, run_tracker_migrations};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn summary(period: SummaryPeriod, d: NaiveDate, total: i64) -> SummaryUsage {
        SummaryUsage {
            period,
            period_key: period.key_for(d),
            category_id: 1,
            total_seconds: total,
            average_daily_seconds: total,
            day_count: 1,
        }
    }

    fn rewrite(d: NaiveDate, total: i64) -> DayRewrite {
        DayRewrite {
            date: d,
            slots: vec![DailyUsage {
                date: d,
                category_id: 1,
                slot_index: 9,
                is_offline: false,
                duration_seconds: total.min(3600),
            }],
            day_summaries: vec![summary(SummaryPeriod::Day, d, total)],
            week_summaries: vec![summary(SummaryPeriod::Week, d, total)],
            month_summaries: vec![summary(SummaryPeriod::Month, d, total)],
            reward_days: vec![RewardPunishmentDay {
                date: d,
                category_id: 1,
                goal_met: true,
                usage_seconds: total,
                goal_seconds: 3600,
                reward_done: false,
                punishment_done: false,
                reward_completion_percent: 0,
                punishment_completion_percent: 0,
            }],
            week_rollups: Vec::new(),
            month_rollups: Vec::new(),
        }
    }

    async fn repo() -> AggregateRepository {
        let pool = create_memory_pool().await.unwrap();
        run_tracker_migrations(&pool).await.unwrap();
        AggregateRepository::new(pool)
    }

    #[tokio::test]
    async fn test_apply_day_replaces_rows() {
        let repo = repo().await;
        repo.apply_day(&rewrite(date(4), 1200)).await.unwrap();
        repo.apply_day(&rewrite(date(4), 1800)).await.unwrap();

        let slots = repo.daily_usage(date(4)).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].duration_seconds, 1800);

        let day = repo.summaries(SummaryPeriod::Day, "2024-03-04").await.unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].total_seconds, 1800);

        let month = repo.summaries(SummaryPeriod::Month, "2024-03").await.unwrap();
        assert_eq!(month[0].total_seconds, 1800);
    }

    #[tokio::test]
    async fn test_day_summaries_between() {
        let repo = repo().await;
        for d in [3, 4, 5] {
            repo.apply_day(&rewrite(date(d), 600)).await.unwrap();
        }
        let rows = repo.day_summaries_between(date(4), date(10)).await.unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|(d, _)| *d).collect();
        assert_eq!(dates, vec![date(4), date(5)]);
    }

    #[tokio::test]
    async fn test_mark_done_sets_percent() {
        let repo = repo().await;
        repo.apply_day(&rewrite(date(4), 600)).await.unwrap();
        assert!(repo.mark_done(date(4), 1, Some(true), None).await.unwrap());
        let days = repo.reward_days_between(date(4), date(4)).await.unwrap();
        assert!(days[0].reward_done);
        assert_eq!(days[0].reward_completion_percent, 100);
        assert!(!days[0].punishment_done);
        assert!(!repo.mark_done(date(5), 1, Some(true), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollups_round_trip() {
        let repo = repo().await;
        let mut rw = rewrite(date(4), 600);
        rw.week_rollups = vec![RewardPunishmentRollup {
            period: SummaryPeriod::Week,
            period_key: "2024-03-04".to_string(),
            category_id: 1,
            evaluated_days: 3,
            goal_met_days: 3,
            rewards_due: 3,
            rewards_done: 2,
            punishments_due: 0,
            punishments_done: 0,
            reward_completion_percent: 66,
            punishment_completion_percent: 0,
        }];
        repo.apply_day(&rw).await.unwrap();
        let week = repo.rollups(SummaryPeriod::Week, "2024-03-04").await.unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].reward_completion_percent, 66);
        assert!(repo.rollups(SummaryPeriod::Day, "2024-03-04").await.unwrap().is_empty());
    }
}
