use serde::{Deserialize, Serialize};

use super::PatientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardPeriod {
    #[default]
    All,
    /// Last 7 days
    Week,
    /// Last 30 days
    Month,
}

impl LeaderboardPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    /// Window length in days (`None` = unbounded)
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::Week => Some(7),
            Self::Month => Some(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    #[default]
    TotalXp,
    Level,
    CurrentStreak,
    AchievementsCount,
}

impl LeaderboardMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalXp => "total_xp",
            Self::Level => "level",
            Self::CurrentStreak => "current_streak",
            Self::AchievementsCount => "achievements_count",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "total_xp" | "xp" => Some(Self::TotalXp),
            "level" => Some(Self::Level),
            "current_streak" | "streak" => Some(Self::CurrentStreak),
            "achievements_count" | "achievements" => Some(Self::AchievementsCount),
            _ => None,
        }
    }
}

/// Computed per query, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub patient_id: PatientId,
    pub display_name: String,
    /// Level the period's XP alone would reach
    pub level: u32,
    /// XP inside the queried period
    pub total_xp: i64,
    /// Live streak, whatever the period
    pub current_streak: u32,
    pub achievements_count: u64,
    pub rank: u32,
}
