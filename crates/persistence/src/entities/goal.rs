//! Goal and reward/punishment entities.

use chrono::NaiveDate;
use domain::models::{GoalCondition, GoalFrequency, RewardPunishmentRollup, SummaryPeriod};
use sqlx::FromRow;
use std::str::FromStr;

/// Database row mapping for the goals table.
#[derive(Debug, Clone, FromRow)]
pub struct GoalEntity {
    pub category_id: i64,
    pub daily_goal_minutes: i32,
    pub condition: String,
    pub reward_text: String,
    pub reward_amount: i32,
    pub reward_unit: String,
    pub punishment_text: String,
    pub punishment_amount: i32,
    pub punishment_unit: String,
    pub frequency: String,
}

impl From<GoalEntity> for domain::models::Goal {
    fn from(entity: GoalEntity) -> Self {
        Self {
            category_id: entity.category_id,
            daily_goal_minutes: entity.daily_goal_minutes,
            condition: GoalCondition::from_str(&entity.condition).unwrap_or_default(),
            reward_text: entity.reward_text,
            reward_amount: entity.reward_amount,
            reward_unit: entity.reward_unit,
            punishment_text: entity.punishment_text,
            punishment_amount: entity.punishment_amount,
            punishment_unit: entity.punishment_unit,
            frequency: GoalFrequency::from_str(&entity.frequency).unwrap_or_default(),
        }
    }
}

/// Database row mapping for the reward_punishment_day table.
#[derive(Debug, Clone, FromRow)]
pub struct RewardPunishmentDayEntity {
    pub date: NaiveDate,
    pub category_id: i64,
    pub goal_met: bool,
    pub usage_seconds: i64,
    pub goal_seconds: i64,
    pub reward_done: bool,
    pub punishment_done: bool,
    pub reward_completion_percent: i32,
    pub punishment_completion_percent: i32,
}

impl From<RewardPunishmentDayEntity> for domain::models::RewardPunishmentDay {
    fn from(entity: RewardPunishmentDayEntity) -> Self {
        Self {
            date: entity.date,
            category_id: entity.category_id,
            goal_met: entity.goal_met,
            usage_seconds: entity.usage_seconds,
            goal_seconds: entity.goal_seconds,
            reward_done: entity.reward_done,
            punishment_done: entity.punishment_done,
            reward_completion_percent: entity.reward_completion_percent,
            punishment_completion_percent: entity.punishment_completion_percent,
        }
    }
}

/// Row of the reward_punishment_{week,month} tables.
#[derive(Debug, Clone, FromRow)]
pub struct RewardPunishmentRollupEntity {
    pub period_key: String,
    pub category_id: i64,
    pub evaluated_days: i64,
    pub goal_met_days: i64,
    pub rewards_due: i64,
    pub rewards_done: i64,
    pub punishments_due: i64,
    pub punishments_done: i64,
    pub reward_completion_percent: i32,
    pub punishment_completion_percent: i32,
}

impl RewardPunishmentRollupEntity {
    pub fn into_model(self, period: SummaryPeriod) -> RewardPunishmentRollup {
        RewardPunishmentRollup {
            period,
            period_key: self.period_key,
            category_id: self.category_id,
            evaluated_days: self.evaluated_days,
            goal_met_days: self.goal_met_days,
            rewards_due: self.rewards_due,
            rewards_done: self.rewards_done,
            punishments_due: self.punishments_due,
            punishments_done: self.punishments_done,
            reward_completion_percent: self.reward_completion_percent,
            punishment_completion_percent: self.punishment_completion_percent,
        }
    }
}
