//! Configuration loading and management
//!
//! Reference data (leveling, crediting rules, achievement/quest/reward
//! catalogs) is supplied externally and consumed at evaluation time.

mod catalog;
mod events;
mod io;

pub use events::{Credit, EventRule, FlagBonus, ItemBonus, TimeBonus};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{Achievement, QuestCategory, QuestDefinition, Reward};
use crate::error::{EngineError, EngineResult};
use crate::gamification::LevelTable;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file (defaults to ~/.physio-quest/engine.db)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Practice timezone, minutes east of UTC; defines calendar days
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default)]
    pub leveling: LevelingConfig,

    /// Crediting rules keyed by event type
    #[serde(default)]
    pub events: HashMap<String, EventRule>,

    #[serde(default)]
    pub streak: StreakConfig,

    #[serde(default)]
    pub achievements: Vec<Achievement>,

    #[serde(default)]
    pub quests: Vec<QuestDefinition>,

    #[serde(default)]
    pub rewards: Vec<Reward>,

    #[serde(default)]
    pub leaderboard: LeaderboardConfig,

    #[serde(default)]
    pub redemption: RedemptionConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Level thresholds: explicit table, or geometric progression when empty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default)]
    pub thresholds: Vec<i64>,
    #[serde(default = "default_base_xp")]
    pub base_xp: i64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
}

fn default_base_xp() -> i64 {
    1000
}

fn default_multiplier() -> f64 {
    1.2
}

fn default_max_level() -> u32 {
    50
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            thresholds: Vec::new(),
            base_xp: default_base_xp(),
            multiplier: default_multiplier(),
            max_level: default_max_level(),
        }
    }
}

impl LevelingConfig {
    pub fn table(&self) -> EngineResult<LevelTable> {
        if self.thresholds.is_empty() {
            LevelTable::geometric(self.base_xp, self.multiplier, self.max_level)
        } else {
            LevelTable::new(self.thresholds.clone())
        }
    }
}

/// Bonus granted when a streak reaches `days`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub days: u32,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakConfig {
    #[serde(default)]
    pub milestones: Vec<StreakMilestone>,
    /// Past the last milestone, repeat its bonus every N days (0 = never)
    #[serde(default)]
    pub repeat_every_days: u32,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            milestones: vec![
                StreakMilestone {
                    days: 3,
                    xp: 50,
                    points: 0,
                },
                StreakMilestone {
                    days: 7,
                    xp: 100,
                    points: 0,
                },
                StreakMilestone {
                    days: 30,
                    xp: 500,
                    points: 0,
                },
            ],
            repeat_every_days: 30,
        }
    }
}

impl StreakConfig {
    /// Milestone reached exactly at `days`, if any
    pub fn milestone_at(&self, days: u32) -> Option<&StreakMilestone> {
        if let Some(m) = self.milestones.iter().find(|m| m.days == days) {
            return Some(m);
        }
        let last = self.milestones.iter().max_by_key(|m| m.days)?;
        if self.repeat_every_days > 0
            && days > last.days
            && (days - last.days) % self.repeat_every_days == 0
        {
            return Some(last);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Cached rankings are reused for at most this long
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionConfig {
    /// A second redemption of the same reward by the same patient inside this
    /// window is treated as a double submit
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_secs: u64,
}

fn default_duplicate_window() -> u64 {
    5
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: default_duplicate_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_rollover_interval")]
    pub rollover_interval_secs: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

fn default_rollover_interval() -> u64 {
    15 * 60
}

fn default_retry_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rollover_interval_secs: default_rollover_interval(),
            retry_interval_secs: default_retry_interval(),
        }
    }
}

impl EngineConfig {
    /// Create a config with the practice's built-in rules and catalog
    pub fn with_defaults() -> Self {
        Self {
            events: catalog::default_event_rules(),
            achievements: catalog::default_achievements(),
            quests: catalog::default_quests(),
            rewards: catalog::default_rewards(),
            ..Self::default()
        }
    }

    /// Check reference data before the engine uses it
    pub fn validate(&self) -> EngineResult<()> {
        self.leveling.table()?;

        for (event_type, rule) in &self.events {
            if rule.has_negative_amount() {
                return Err(EngineError::InvalidConfig(format!(
                    "event rule '{event_type}' has a negative amount"
                )));
            }
        }

        let mut codes = HashSet::new();
        for achievement in &self.achievements {
            if !codes.insert(achievement.code.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate achievement code '{}'",
                    achievement.code
                )));
            }
            if achievement.xp_reward < 0 || achievement.points_reward < 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "achievement '{}' has a negative reward",
                    achievement.code
                )));
            }
        }

        let mut quest_ids = HashSet::new();
        for quest in &self.quests {
            if !quest_ids.insert(quest.id.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate quest id '{}'",
                    quest.id
                )));
            }
            if quest.target.count == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "quest '{}' has a zero target",
                    quest.id
                )));
            }
            if quest.xp_reward < 0 || quest.points_reward < 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "quest '{}' has a negative reward",
                    quest.id
                )));
            }
            if quest.category == QuestCategory::Special && quest.ends_at.is_none() {
                return Err(EngineError::InvalidConfig(format!(
                    "special quest '{}' needs ends_at",
                    quest.id
                )));
            }
        }

        let mut reward_ids = HashSet::new();
        for reward in &self.rewards {
            if !reward_ids.insert(reward.id.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate reward id '{}'",
                    reward.id
                )));
            }
            if reward.point_cost <= 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "reward '{}' must cost more than 0 points",
                    reward.id
                )));
            }
            if reward.stock.is_some_and(|s| s < 0) {
                return Err(EngineError::InvalidConfig(format!(
                    "reward '{}' has negative stock",
                    reward.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuestDifficulty, QuestTarget};

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::with_defaults();
        config.validate().unwrap();
        assert!(config.events.contains_key("session_completed"));
        assert!(!config.achievements.is_empty());
        assert!(!config.rewards.is_empty());
    }

    #[test]
    fn test_streak_milestones_repeat() {
        let streak = StreakConfig::default();
        assert_eq!(streak.milestone_at(3).map(|m| m.xp), Some(50));
        assert_eq!(streak.milestone_at(7).map(|m| m.xp), Some(100));
        assert!(streak.milestone_at(8).is_none());
        assert_eq!(streak.milestone_at(60).map(|m| m.xp), Some(500));
        assert!(streak.milestone_at(45).is_none());
    }

    #[test]
    fn test_rejects_zero_cost_reward() {
        let mut config = EngineConfig::with_defaults();
        config.rewards[0].point_cost = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_target_quest() {
        let mut config = EngineConfig::default();
        config.quests.push(QuestDefinition {
            id: "broken".to_string(),
            title: "Broken".to_string(),
            description: String::new(),
            category: QuestCategory::Daily,
            difficulty: QuestDifficulty::Easy,
            target: QuestTarget {
                event_type: "session_completed".to_string(),
                count: 0,
            },
            xp_reward: 10,
            points_reward: 0,
            active: true,
            starts_at: None,
            ends_at: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_src = r#"
            utc_offset_minutes = -180

            [leveling]
            thresholds = [0, 100, 300, 600]

            [events.session_completed]
            xp = 50
            points = 25
            reason = "session_completed"

            [[rewards]]
            id = "mug"
            title = "Clinic mug"
            point_cost = 300
            stock = 2
        "#;
        let config: EngineConfig = toml::from_str(toml_src).unwrap();
        config.validate().unwrap();
        assert_eq!(config.leveling.table().unwrap().max_level(), 4);
        assert_eq!(config.events["session_completed"].points, 25);
        assert!(config.events["session_completed"].qualifies_for_streak);
        assert_eq!(config.rewards[0].stock, Some(2));
        assert!(config.rewards[0].active);
    }
}
