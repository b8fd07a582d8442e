//! Inbound activity and direct ledger credits

use rusqlite::params;
use tracing::{debug, info, warn};

use super::Engine;
use crate::domain::{
    ActivityEvent, Currency, GamificationProfile, LedgerEntry, LedgerReason, PatientQuest,
    UnlockedAchievement,
};
use crate::error::{EngineError, EngineResult};
use crate::gamification::streaks::{self, StreakUpdate};
use crate::gamification::{calendar, ledger, quests};

/// Everything a reported event changed
#[derive(Debug, Clone)]
pub struct EventOutcome {
    /// Row id of the recorded activity
    pub event_id: i64,
    pub credited: Vec<LedgerEntry>,
    /// Labels of bonuses included in the credit
    pub bonuses: Vec<String>,
    /// `None` when the event type does not count towards streaks
    pub streak: Option<StreakUpdate>,
    pub unlocked: Vec<UnlockedAchievement>,
    pub completed_quests: Vec<PatientQuest>,
    pub profile: GamificationProfile,
}

impl Engine {
    /// Process an activity event for a patient
    ///
    /// Records the event and credits it per its rule, then updates the streak
    /// (one transaction). Achievement evaluation and quest progress follow in
    /// their own transactions: their failure never undoes the credit.
    /// Unknown event types are recorded but earn nothing.
    ///
    /// The streak day and the time-of-day bonus follow the engine clock; the
    /// reported timestamp is stored as-is but never moves the streak.
    pub fn report_event(&self, event: &ActivityEvent) -> EngineResult<EventOutcome> {
        let patient_id = event.patient_id.as_str();
        if patient_id.is_empty() {
            return Err(EngineError::ProfileNotFound(String::new()));
        }

        self.inner.patient_locks.with(patient_id, || {
            let rules = &self.inner.rules;
            let now = self.now_ms();
            let occurred_at = event.timestamp.timestamp_millis();
            let day_key = rules.day_key(now);
            let rule = rules.config.events.get(&event.event_type);

            let (event_id, credited, bonuses, streak) = self.transact(|conn, notes| {
                ledger::ensure_profile(conn, patient_id, now)?;
                conn.execute(
                    r#"INSERT INTO activity_events (patient_id, event_type, occurred_at, day_key, metadata)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![
                        patient_id,
                        event.event_type,
                        occurred_at,
                        day_key,
                        serde_json::to_string(&event.metadata)?,
                    ],
                )?;
                let event_id = conn.last_insert_rowid();

                let Some(rule) = rule else {
                    debug!(patient_id, event_type = %event.event_type, "No crediting rule, event recorded only");
                    return Ok((event_id, Vec::new(), Vec::new(), None));
                };

                let credit = rule.credit_for(&event.metadata, calendar::local_hour(now, rules.offset));
                let description = if credit.bonuses.is_empty() {
                    event.event_type.clone()
                } else {
                    format!("{} ({})", event.event_type, credit.bonuses.join(", "))
                };
                let credited = ledger::credit_both(
                    conn,
                    &rules.levels,
                    patient_id,
                    credit.xp,
                    credit.points,
                    rule.reason,
                    &description,
                    now,
                    notes,
                )?;

                let streak = if rule.qualifies_for_streak {
                    Some(streaks::record_activity(conn, rules, patient_id, &day_key, now, notes)?)
                } else {
                    None
                };
                Ok((event_id, credited, credit.bonuses, streak))
            })?;

            let unlocked = self.evaluate_achievements(patient_id, now);

            let completed_quests = match self.transact(|conn, notes| {
                quests::issue_current(conn, rules, patient_id, now)?;
                quests::record_progress(conn, patient_id, &event.event_type, now, notes)
            }) {
                Ok(completed) => completed,
                Err(e) => {
                    warn!(patient_id, error = %e, "Quest progress update failed");
                    Vec::new()
                }
            };

            let profile = self.stored_profile(patient_id)?;

            info!(
                patient_id,
                event_type = %event.event_type,
                xp = profile.total_xp,
                streak = profile.current_streak,
                "Event processed"
            );
            Ok(EventOutcome {
                event_id,
                credited,
                bonuses,
                streak,
                unlocked,
                completed_quests,
                profile,
            })
        })
    }

    /// Append one ledger entry and re-evaluate achievements
    ///
    /// Negative amounts are only accepted for `LedgerReason::Redemption`;
    /// prefer `redeem_reward`, which also handles stock and the record.
    pub fn append_ledger_entry(
        &self,
        patient_id: &str,
        currency: Currency,
        amount: i64,
        reason: LedgerReason,
        description: &str,
    ) -> EngineResult<ledger::AppendOutcome> {
        ledger::validate_amount(currency, amount, reason)?;
        self.inner.patient_locks.with(patient_id, || {
            let now = self.now_ms();
            let rules = &self.inner.rules;
            let outcome = self.transact(|conn, notes| {
                ledger::append(conn, &rules.levels, patient_id, currency, amount, reason, description, now, notes)
            })?;
            if self.evaluate_achievements(patient_id, now).is_empty() {
                return Ok(outcome);
            }
            let profile = self.stored_profile(patient_id)?;
            Ok(ledger::AppendOutcome { profile, ..outcome })
        })
    }

    /// Therapist/administrator award: credits `amount` as both XP and points
    pub fn grant_manual_award(
        &self,
        patient_id: &str,
        amount: i64,
        description: &str,
    ) -> EngineResult<GamificationProfile> {
        ledger::validate_amount(Currency::Xp, amount, LedgerReason::ManualAward)?;
        self.inner.patient_locks.with(patient_id, || {
            let now = self.now_ms();
            let rules = &self.inner.rules;
            self.transact(|conn, notes| {
                ledger::credit_both(
                    conn,
                    &rules.levels,
                    patient_id,
                    amount,
                    amount,
                    LedgerReason::ManualAward,
                    description,
                    now,
                    notes,
                )
            })?;
            info!(patient_id, amount, description, "Manual award granted");
            self.evaluate_achievements(patient_id, now);
            self.stored_profile(patient_id)
        })
    }
}
