//! Core domain types for the gamification engine
//!
//! Plain data: everything here is produced by the engine or loaded from the
//! store. Behaviour lives in `crate::gamification`.

mod achievement;
mod event;
mod leaderboard;
mod ledger;
mod quest;
mod reward;

pub use achievement::{Achievement, UnlockRule, UnlockedAchievement};
pub use event::ActivityEvent;
pub use leaderboard::{LeaderboardEntry, LeaderboardMetric, LeaderboardPeriod};
pub use ledger::{Currency, GamificationProfile, LedgerEntry, LedgerReason, PatientId};
pub use quest::{
    PatientQuest, QuestCategory, QuestDefinition, QuestDifficulty, QuestProgress, QuestStatus,
    QuestTarget,
};
pub use reward::{Redemption, Reward, RewardKind};
