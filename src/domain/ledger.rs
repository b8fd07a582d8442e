use serde::{Deserialize, Serialize};

/// Patients are identified by the practice's opaque patient id
pub type PatientId = String;

/// The two independent currencies tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Experience: determines level, never spent
    Xp,
    /// Spendable balance for the rewards shop
    Points,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xp => "xp",
            Self::Points => "points",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "xp" => Some(Self::Xp),
            "points" => Some(Self::Points),
            _ => None,
        }
    }
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    SessionCompleted,
    /// Any other credited activity (exercise, goal, appointment...)
    Activity,
    StreakBonus,
    AchievementUnlock,
    QuestClaim,
    ManualAward,
    /// The only reason allowed to carry a negative amount
    Redemption,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCompleted => "session_completed",
            Self::Activity => "activity",
            Self::StreakBonus => "streak_bonus",
            Self::AchievementUnlock => "achievement_unlock",
            Self::QuestClaim => "quest_claim",
            Self::ManualAward => "manual_award",
            Self::Redemption => "redemption",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "session_completed" => Some(Self::SessionCompleted),
            "activity" => Some(Self::Activity),
            "streak_bonus" => Some(Self::StreakBonus),
            "achievement_unlock" => Some(Self::AchievementUnlock),
            "quest_claim" => Some(Self::QuestClaim),
            "manual_award" => Some(Self::ManualAward),
            "redemption" => Some(Self::Redemption),
            _ => None,
        }
    }
}

/// Immutable signed credit/debit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub patient_id: PatientId,
    pub currency: Currency,
    /// Positive = credit, negative = debit; never zero
    pub amount: i64,
    pub reason: LedgerReason,
    pub description: String,
    /// Unix milliseconds
    pub created_at: i64,
}

/// Cached per-patient aggregate
///
/// `total_xp` and `total_points` always equal the ledger sums for the
/// patient; they are rewritten in the same transaction as every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub patient_id: PatientId,
    pub display_name: String,
    pub total_xp: i64,
    /// Derived from `total_xp`, cached for display only
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_points: i64,
    /// Last qualifying activity day (`YYYY-MM-DD`, practice-local)
    pub last_activity_day: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}
