//! Daily goals and the reward/punishment records derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::usage::SummaryPeriod;

/// How usage is compared with the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalCondition {
    /// Use at most the goal (e.g. entertainment).
    #[default]
    LessOrEqual,
    /// Use at least the goal (e.g. study).
    GreaterOrEqual,
}

impl GoalCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCondition::LessOrEqual => "less_or_equal",
            GoalCondition::GreaterOrEqual => "greater_or_equal",
        }
    }

    pub fn is_met(&self, usage_seconds: i64, goal_seconds: i64) -> bool {
        match self {
            GoalCondition::LessOrEqual => usage_seconds <= goal_seconds,
            GoalCondition::GreaterOrEqual => usage_seconds >= goal_seconds,
        }
    }
}

impl FromStr for GoalCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "less_or_equal" => Ok(GoalCondition::LessOrEqual),
            "greater_or_equal" => Ok(GoalCondition::GreaterOrEqual),
            _ => Err(format!("Invalid goal condition: {}", s)),
        }
    }
}

impl fmt::Display for GoalCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GoalFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl GoalFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalFrequency::Daily => "daily",
            GoalFrequency::Weekly => "weekly",
            GoalFrequency::Monthly => "monthly",
        }
    }
}

impl FromStr for GoalFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(GoalFrequency::Daily),
            "weekly" => Ok(GoalFrequency::Weekly),
            "monthly" => Ok(GoalFrequency::Monthly),
            _ => Err(format!("Invalid goal frequency: {}", s)),
        }
    }
}

impl fmt::Display for GoalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category's daily goal with its reward and punishment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub category_id: i64,
    #[validate(range(min = 1, max = 1440, message = "Goal must be 1-1440 minutes"))]
    pub daily_goal_minutes: i32,
    pub condition: GoalCondition,
    #[validate(length(max = 100))]
    pub reward_text: String,
    #[validate(range(min = 0))]
    pub reward_amount: i32,
    #[validate(length(max = 20))]
    pub reward_unit: String,
    #[validate(length(max = 100))]
    pub punishment_text: String,
    #[validate(range(min = 0))]
    pub punishment_amount: i32,
    #[validate(length(max = 20))]
    pub punishment_unit: String,
    pub frequency: GoalFrequency,
}

impl Goal {
    pub fn goal_seconds(&self) -> i64 {
        self.daily_goal_minutes as i64 * 60
    }
}

/// Outcome of one category's goal on one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardPunishmentDay {
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

impl RewardPunishmentDay {
    /// A reward earned but not yet taken.
    pub fn reward_pending(&self) -> bool {
        self.goal_met && !self.reward_done
    }

    /// A punishment owed but not yet carried out.
    pub fn punishment_pending(&self) -> bool {
        !self.goal_met && !self.punishment_done
    }
}

/// Week or month rollup of daily records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardPunishmentRollup {
    pub period: SummaryPeriod,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(minutes: i32, condition: GoalCondition) -> Goal {
        Goal {
            category_id: 1,
            daily_goal_minutes: minutes,
            condition,
            reward_text: "Dessert".to_string(),
            reward_amount: 1,
            reward_unit: "piece".to_string(),
            punishment_text: "Push-ups".to_string(),
            punishment_amount: 20,
            punishment_unit: "reps".to_string(),
            frequency: GoalFrequency::Daily,
        }
    }

    #[test]
    fn test_less_or_equal() {
        let g = goal(60, GoalCondition::LessOrEqual);
        assert!(g.condition.is_met(50 * 60, g.goal_seconds()));
        assert!(g.condition.is_met(60 * 60, g.goal_seconds()));
        assert!(!g.condition.is_met(70 * 60, g.goal_seconds()));
    }

    #[test]
    fn test_greater_or_equal() {
        let g = goal(30, GoalCondition::GreaterOrEqual);
        assert!(!g.condition.is_met(29 * 60, g.goal_seconds()));
        assert!(g.condition.is_met(45 * 60, g.goal_seconds()));
    }

    #[test]
    fn test_goal_validation() {
        assert!(goal(60, GoalCondition::LessOrEqual).validate().is_ok());
        assert!(goal(0, GoalCondition::LessOrEqual).validate().is_err());
        assert!(goal(1441, GoalCondition::LessOrEqual).validate().is_err());
    }

    #[test]
    fn test_condition_strings() {
        assert_eq!(
            GoalCondition::from_str("greater_or_equal").unwrap(),
            GoalCondition::GreaterOrEqual
        );
        assert!(GoalCondition::from_str("equal").is_err());
        assert_eq!(GoalFrequency::from_str("weekly").unwrap(), GoalFrequency::Weekly);
    }

    #[test]
    fn test_pending_flags() {
        let mut day = RewardPunishmentDay {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            category_id: 1,
            goal_met: true,
            usage_seconds: 100,
            goal_seconds: 3600,
            reward_done: false,
            punishment_done: false,
            reward_completion_percent: 0,
            punishment_completion_percent: 0,
        };
        assert!(day.reward_pending());
        assert!(!day.punishment_pending());
        day.goal_met = false;
        assert!(!day.reward_pending());
        assert!(day.punishment_pending());
    }
}
