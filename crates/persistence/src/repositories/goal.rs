//! Goal repository.

use domain::models::Goal;
use sqlx::SqlitePool;

use crate::entities::GoalEntity;
use crate::metrics::QueryTimer;

const GOAL_COLUMNS: &str = r#"
    category_id, daily_goal_minutes, condition, reward_text, reward_amount, reward_unit,
    punishment_text, punishment_amount, punishment_unit, frequency
"#;

/// Repository for per-category goals.
#[derive(Clone)]
pub struct GoalRepository {
    pool: SqlitePool,
}

impl GoalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<GoalEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_goals");
        let sql = format!("SELECT {} FROM goals ORDER BY category_id", GOAL_COLUMNS);
        let result = sqlx::query_as::<_, GoalEntity>(&sql)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn find(&self, category_id: i64) -> Result<Option<GoalEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_goal");
        let sql = format!("SELECT {} FROM goals WHERE category_id = ?1", GOAL_COLUMNS);
        let result = sqlx::query_as::<_, GoalEntity>(&sql)
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Create or replace the goal of a category.
    pub async fn upsert(&self, goal: &Goal) -> Result<GoalEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_goal");
        let sql = format!(
            r#"
            INSERT INTO goals ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (category_id) DO UPDATE SET
                daily_goal_minutes = excluded.daily_goal_minutes,
                condition = excluded.condition,
                reward_text = excluded.reward_text,
                reward_amount = excluded.reward_amount,
                reward_unit = excluded.reward_unit,
                punishment_text = excluded.punishment_text,
                punishment_amount = excluded.punishment_amount,
                punishment_unit = excluded.punishment_unit,
                frequency = excluded.frequency
            RETURNING {}
            "#,
            GOAL_COLUMNS, GOAL_COLUMNS
        );
        let result = sqlx::query_as::<_, GoalEntity>(&sql)
            .bind(goal.category_id)
            .bind(goal.daily_goal_minutes)
            .bind(goal.condition.as_str())
            .bind(&goal.reward_text)
            .bind(goal.reward_amount)
            .bind(&goal.reward_unit)
            .bind(&goal.punishment_text)
            .bind(goal.punishment_amount)
            .bind(&goal.punishment_unit)
            .bind(goal.frequency.as_str())
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn delete(&self, category_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_goal");
        let result = sqlx::query("DELETE FROM goals WHERE category_id = ?1")
            .bind(category_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}
