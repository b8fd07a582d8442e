use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PatientId;

/// Issuance cadence of a quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestCategory {
    Daily,
    Weekly,
    /// One instance per patient inside the definition's time window
    Special,
}

impl QuestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Special => "special",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "special" => Some(Self::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl QuestDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// What counts towards a quest: `count` events of `event_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestTarget {
    pub event_type: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: QuestCategory,
    #[serde(default)]
    pub difficulty: QuestDifficulty,
    pub target: QuestTarget,
    #[serde(default)]
    pub xp_reward: i64,
    #[serde(default)]
    pub points_reward: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Special quests only: window in which the quest is issued
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    NotStarted,
    InProgress,
    Completed,
    Expired,
    Claimed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Claimed => "claimed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "claimed" => Some(Self::Claimed),
            _ => None,
        }
    }

    /// Still accepting progress
    pub fn is_open(&self) -> bool {
        matches!(self, Self::NotStarted | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub current: u32,
    pub target: u32,
}

impl QuestProgress {
    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }

    /// Percentage in [0, 100]
    pub fn percentage(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        (self.current as f64 / self.target as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// A quest instance issued to one patient for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientQuest {
    pub id: String,
    pub patient_id: PatientId,
    pub quest_id: String,
    pub title: String,
    pub category: QuestCategory,
    /// Issuance period ("2026-10-19", "2026-W43", "special")
    pub period_key: String,
    pub status: QuestStatus,
    pub progress: QuestProgress,
    pub xp_reward: i64,
    pub points_reward: i64,
    /// Unix milliseconds
    pub expires_at: i64,
    pub completed_at: Option<i64>,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
}
