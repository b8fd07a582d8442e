//! Per-event-type crediting rules
//!
//! XP and points are credited independently: each rule states both amounts
//! explicitly, so an event type can feed one currency, both, or neither.

use serde::{Deserialize, Serialize};

use crate::domain::LedgerReason;

/// Bonus scaled by a numeric metadata field (e.g. exercises in a session)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBonus {
    pub metadata_key: String,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub points: i64,
    /// Items beyond this count earn nothing
    pub cap: u64,
}

/// Bonus granted when a boolean metadata field is true (e.g. `on_time`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagBonus {
    pub metadata_key: String,
    pub label: String,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub points: i64,
}

/// Bonus for activity inside a local-time window `[from_hour, until_hour)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBonus {
    pub label: String,
    pub from_hour: u32,
    pub until_hour: u32,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRule {
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub points: i64,
    #[serde(default = "default_reason")]
    pub reason: LedgerReason,
    #[serde(default = "default_true")]
    pub qualifies_for_streak: bool,
    #[serde(default)]
    pub per_item: Option<ItemBonus>,
    #[serde(default)]
    pub flag_bonuses: Vec<FlagBonus>,
    /// First matching window wins
    #[serde(default)]
    pub time_bonuses: Vec<TimeBonus>,
}

fn default_reason() -> LedgerReason {
    LedgerReason::Activity
}

fn default_true() -> bool {
    true
}

/// Amounts an event earns, with the labels of any bonuses applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credit {
    pub xp: i64,
    pub points: i64,
    pub bonuses: Vec<String>,
}

impl EventRule {
    pub fn flat(xp: i64, points: i64, reason: LedgerReason) -> Self {
        Self {
            xp,
            points,
            reason,
            qualifies_for_streak: true,
            per_item: None,
            flag_bonuses: Vec::new(),
            time_bonuses: Vec::new(),
        }
    }

    /// Compute the credit for one event
    pub fn credit_for(&self, metadata: &serde_json::Value, local_hour: u32) -> Credit {
        let mut credit = Credit {
            xp: self.xp,
            points: self.points,
            bonuses: Vec::new(),
        };

        if let Some(bonus) = &self.per_item {
            let items = metadata
                .get(&bonus.metadata_key)
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
                .min(bonus.cap) as i64;
            if items > 0 {
                credit.xp += items * bonus.xp;
                credit.points += items * bonus.points;
                credit.bonuses.push(format!("{} {}", items, bonus.metadata_key));
            }
        }

        for flag in &self.flag_bonuses {
            if metadata.get(&flag.metadata_key).and_then(|v| v.as_bool()) == Some(true) {
                credit.xp += flag.xp;
                credit.points += flag.points;
                credit.bonuses.push(flag.label.clone());
            }
        }

        if let Some(window) = self
            .time_bonuses
            .iter()
            .find(|w| local_hour >= w.from_hour && local_hour < w.until_hour)
        {
            credit.xp += window.xp;
            credit.points += window.points;
            credit.bonuses.push(window.label.clone());
        }

        credit
    }

    /// Any configured amount below zero
    pub(crate) fn has_negative_amount(&self) -> bool {
        self.xp < 0
            || self.points < 0
            || self
                .per_item
                .as_ref()
                .is_some_and(|b| b.xp < 0 || b.points < 0)
            || self.flag_bonuses.iter().any(|b| b.xp < 0 || b.points < 0)
            || self.time_bonuses.iter().any(|b| b.xp < 0 || b.points < 0)
    }
}
