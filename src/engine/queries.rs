//! Read-only queries and administrator maintenance

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Engine;
use crate::domain::{
    Achievement, GamificationProfile, LeaderboardEntry, LeaderboardMetric, LeaderboardPeriod,
    LedgerEntry, PatientQuest, QuestCategory, Redemption, Reward, UnlockedAchievement,
};
use crate::error::{EngineError, EngineResult};
use crate::gamification::admin::{self, AtRiskPatient, EngagementStats};
use crate::gamification::{LevelInfo, achievements, leaderboard, ledger, quests, rewards, streaks};

/// Profile as seen on `now`: level and streak derived at read time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    /// `current_streak` is already projected to today
    pub profile: GamificationProfile,
    pub level: LevelInfo,
    pub freeze_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementsView {
    pub unlocked: Vec<UnlockedAchievement>,
    /// Active achievements not unlocked yet
    pub locked: Vec<Achievement>,
}

impl Engine {
    pub fn get_profile(&self, patient_id: &str) -> EngineResult<ProfileView> {
        let rules = &self.inner.rules;
        let today = rules.day_key(self.now_ms());
        self.read(|conn| {
            let mut profile = ledger::load_profile(conn, patient_id)?
                .ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))?;
            let freeze_tokens = streaks::available_freeze_tokens(conn, patient_id)?;
            profile.current_streak = streaks::project_current(
                profile.current_streak,
                profile.last_activity_day.as_deref(),
                &today,
                freeze_tokens,
            );
            let level = rules.levels.level_for(profile.total_xp);
            profile.level = level.level;
            Ok(ProfileView {
                profile,
                level,
                freeze_tokens,
            })
        })
    }

    pub fn get_achievements(&self, patient_id: &str) -> EngineResult<AchievementsView> {
        self.read(|conn| {
            admin::require_profile(conn, patient_id)?;
            let unlocked = achievements::unlocked(conn, patient_id)?;
            let locked = achievements::catalog(conn, false)?
                .into_iter()
                .filter(|a| !unlocked.iter().any(|u| u.achievement_id == a.id))
                .collect();
            Ok(AchievementsView { unlocked, locked })
        })
    }

    /// Current quests plus completed ones waiting to be claimed
    pub fn get_quests(&self, patient_id: &str, category: Option<QuestCategory>) -> EngineResult<Vec<PatientQuest>> {
        let now = self.now_ms();
        self.read(|conn| {
            admin::require_profile(conn, patient_id)?;
            quests::list(conn, patient_id, category, now)
        })
    }

    pub fn get_rewards_catalog(&self) -> EngineResult<Vec<Reward>> {
        self.read(rewards::catalog)
    }

    /// Ranking for a period and metric, served from the TTL cache
    ///
    /// `limit` of `None` returns every patient.
    pub fn get_leaderboard(
        &self,
        period: LeaderboardPeriod,
        metric: LeaderboardMetric,
        limit: Option<usize>,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        let now = self.now_ms();
        let ranking: Arc<Vec<LeaderboardEntry>> = self.inner.leaderboard.get_or_compute(period, metric, || {
            self.read(|conn| leaderboard::rank(conn, &self.inner.rules, period, metric, now))
        })?;
        let take = limit.unwrap_or(ranking.len());
        Ok(ranking.iter().take(take).cloned().collect())
    }

    /// Drop cached rankings so the next query recomputes
    pub fn invalidate_leaderboard(&self) {
        self.inner.leaderboard.invalidate();
    }

    pub fn ledger_history(&self, patient_id: &str, limit: usize) -> EngineResult<Vec<LedgerEntry>> {
        self.read(|conn| ledger::history(conn, patient_id, limit))
    }

    pub fn redemption_history(&self, patient_id: &str) -> EngineResult<Vec<Redemption>> {
        self.read(|conn| rewards::redemptions(conn, patient_id))
    }

    pub fn engagement_stats(&self, window_days: i64) -> EngineResult<EngagementStats> {
        let now = self.now_ms();
        self.read(|conn| admin::engagement_stats(conn, &self.inner.rules, window_days, now))
    }

    pub fn at_risk_patients(&self, limit: usize) -> EngineResult<Vec<AtRiskPatient>> {
        let now = self.now_ms();
        self.read(|conn| admin::at_risk_patients(conn, &self.inner.rules, limit, now))
    }

    /// Administrator reset of a patient's current streak
    pub fn reset_streak(&self, patient_id: &str) -> EngineResult<GamificationProfile> {
        self.inner.patient_locks.with(patient_id, || {
            let now = self.now_ms();
            self.transact(|conn, _| streaks::reset(conn, patient_id, now))?;
            info!(patient_id, "Streak reset by administrator");
            self.stored_profile(patient_id)
        })
    }

    pub fn set_display_name(&self, patient_id: &str, display_name: &str) -> EngineResult<GamificationProfile> {
        self.inner.patient_locks.with(patient_id, || {
            let now = self.now_ms();
            self.transact(|conn, _| admin::set_display_name(conn, patient_id, display_name, now))?;
            self.stored_profile(patient_id)
        })
    }
}
