use serde::{Deserialize, Serialize};

use super::PatientId;

/// Declarative unlock condition evaluated against a patient's stats snapshot
///
/// New achievements are data: they are declared in the catalog with one of
/// these rules instead of code in the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockRule {
    TotalXpAtLeast { xp: i64 },
    LevelAtLeast { level: u32 },
    StreakAtLeast { days: u32 },
    LongestStreakAtLeast { days: u32 },
    EventCountAtLeast { event_type: String, count: u64 },
    QuestsClaimedAtLeast { count: u64 },
    RedemptionsAtLeast { count: u64 },
    AllOf { rules: Vec<UnlockRule> },
    AnyOf { rules: Vec<UnlockRule> },
}

/// Administrator-managed achievement definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    /// Store id (0 until synced)
    #[serde(default)]
    pub id: i64,
    /// Unique, stable code (e.g. "streak_7")
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub xp_reward: i64,
    #[serde(default)]
    pub points_reward: i64,
    pub unlock_rule: UnlockRule,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Existence of this row is the only unlock signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub patient_id: PatientId,
    pub achievement_id: i64,
    pub code: String,
    pub title: String,
    pub xp_reward: i64,
    /// Unix milliseconds
    pub unlocked_at: i64,
}
