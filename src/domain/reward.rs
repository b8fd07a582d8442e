use serde::{Deserialize, Serialize};

use super::PatientId;

/// What a redemption hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Fulfilled outside the engine (voucher, merchandise...)
    #[default]
    Item,
    /// Grants one streak freeze token
    StreakFreeze,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::StreakFreeze => "streak_freeze",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "item" => Some(Self::Item),
            "streak_freeze" => Some(Self::StreakFreeze),
            _ => None,
        }
    }
}

/// Catalog entry in the rewards shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Always > 0
    pub point_cost: i64,
    /// `None` = unlimited
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub kind: RewardKind,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Immutable record of a committed redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub patient_id: PatientId,
    pub reward_id: String,
    pub points_spent: i64,
    /// The paired debit entry
    pub ledger_entry_id: String,
    /// Unix milliseconds
    pub claimed_at: i64,
}
