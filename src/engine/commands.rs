//! Quest claims and reward redemptions

use tracing::info;

use super::Engine;
use crate::domain::{GamificationProfile, PatientQuest, Redemption, Reward, UnlockedAchievement};
use crate::error::{EngineError, EngineResult};
use crate::gamification::{quests, rewards};

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub quest: PatientQuest,
    pub profile: GamificationProfile,
    pub unlocked: Vec<UnlockedAchievement>,
}

#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub redemption: Redemption,
    /// Reward after the stock decrement
    pub reward: Reward,
    pub profile: GamificationProfile,
    pub unlocked: Vec<UnlockedAchievement>,
}

impl Engine {
    /// Claim a completed quest instance
    ///
    /// A second claim fails with `QuestAlreadyClaimed` and credits nothing.
    pub fn claim_quest(&self, patient_quest_id: &str) -> EngineResult<ClaimOutcome> {
        let patient_id = self
            .read(|conn| quests::load(conn, patient_quest_id))?
            .map(|q| q.patient_id)
            .ok_or_else(|| EngineError::UnknownQuest(patient_quest_id.to_string()))?;

        self.inner.patient_locks.with(&patient_id, || {
            let now = self.now_ms();
            let rules = &self.inner.rules;
            let quest = self.transact(|conn, notes| quests::claim(conn, rules, patient_quest_id, now, notes))?;
            let unlocked = self.evaluate_achievements(&patient_id, now);
            let profile = self.stored_profile(&patient_id)?;
            Ok(ClaimOutcome {
                quest,
                profile,
                unlocked,
            })
        })
    }

    /// Spend points on a reward
    ///
    /// Serialized per patient and per reward; balance and stock are checked
    /// against live data inside the committing transaction.
    pub fn redeem_reward(&self, patient_id: &str, reward_id: &str) -> EngineResult<RedeemOutcome> {
        self.inner.patient_locks.with(patient_id, || {
            self.inner.reward_locks.with(reward_id, || {
                let now = self.now_ms();
                let rules = &self.inner.rules;
                let receipt =
                    self.transact(|conn, notes| rewards::redeem(conn, rules, patient_id, reward_id, now, notes))?;
                info!(
                    patient_id,
                    reward_id,
                    remaining_points = receipt.remaining_points,
                    "Redemption committed"
                );
                let unlocked = self.evaluate_achievements(patient_id, now);
                let profile = self.stored_profile(patient_id)?;
                Ok(RedeemOutcome {
                    redemption: receipt.redemption,
                    reward: receipt.reward,
                    profile,
                    unlocked,
                })
            })
        })
    }

    /// Add stock to a finite reward
    pub fn restock_reward(&self, reward_id: &str, amount: i64) -> EngineResult<Reward> {
        self.inner
            .reward_locks
            .with(reward_id, || self.transact(|conn, _| rewards::restock(conn, reward_id, amount)))
    }
}
