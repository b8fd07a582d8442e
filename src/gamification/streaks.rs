//! Streak tracking
//!
//! One streak per patient, counted in practice-local calendar days. Missed
//! days can be bridged by freeze tokens bought in the rewards shop.

use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::Rules;
use super::calendar;
use super::ledger;
use crate::config::StreakMilestone;
use crate::domain::LedgerReason;
use crate::error::{EngineError, EngineResult};
use crate::notify::Notification;

/// How an activity changed the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// First qualifying activity ever
    Started,
    /// Already counted today (or an activity dated before the last one)
    Unchanged,
    /// Consecutive day
    Extended,
    /// Gap bridged by consuming freeze tokens
    Frozen { tokens_used: u32 },
    /// Gap too long: streak restarts at 1
    Reset,
}

/// Outcome of the pure streak transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakStep {
    pub transition: StreakTransition,
    pub current: u32,
}

/// Compute the next streak value for activity on `today`
pub fn next_streak(current: u32, last_day: Option<&str>, today: &str, freeze_tokens: u32) -> StreakStep {
    let Some(last_day) = last_day else {
        return StreakStep {
            transition: StreakTransition::Started,
            current: 1,
        };
    };

    let gap = calendar::days_between(last_day, today).unwrap_or(i64::MAX);
    match gap {
        g if g <= 0 => StreakStep {
            transition: StreakTransition::Unchanged,
            current,
        },
        1 => StreakStep {
            transition: StreakTransition::Extended,
            current: current + 1,
        },
        g => {
            let missed = g - 1;
            if current > 0 && missed <= i64::from(freeze_tokens) {
                StreakStep {
                    transition: StreakTransition::Frozen {
                        tokens_used: missed as u32,
                    },
                    current: current + 1,
                }
            } else {
                StreakStep {
                    transition: StreakTransition::Reset,
                    current: 1,
                }
            }
        }
    }
}

/// Streak as it stands on `today` without recording anything
///
/// A streak whose gap cannot be bridged by the available tokens reads as 0;
/// the stored value is only corrected by the next activity.
pub fn project_current(current: u32, last_day: Option<&str>, today: &str, freeze_tokens: u32) -> u32 {
    let Some(last_day) = last_day else {
        return 0;
    };
    match calendar::days_between(last_day, today) {
        Some(g) if g <= 1 => current,
        Some(g) if g - 1 <= i64::from(freeze_tokens) => current,
        _ => 0,
    }
}

/// Unused freeze tokens held by a patient
pub fn available_freeze_tokens(conn: &Connection, patient_id: &str) -> EngineResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM freeze_tokens WHERE patient_id = ?1 AND consumed_at IS NULL",
        [patient_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Add one token to the patient's inventory
pub fn grant_freeze_token(
    conn: &Connection,
    patient_id: &str,
    redemption_id: Option<&str>,
    now_ms: i64,
) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO freeze_tokens (patient_id, redemption_id, acquired_at) VALUES (?1, ?2, ?3)",
        params![patient_id, redemption_id, now_ms],
    )?;
    Ok(())
}

fn consume_freeze_tokens(conn: &Connection, patient_id: &str, count: u32, now_ms: i64) -> EngineResult<()> {
    let consumed = conn.execute(
        r#"UPDATE freeze_tokens SET consumed_at = ?1
           WHERE id IN (
               SELECT id FROM freeze_tokens
               WHERE patient_id = ?2 AND consumed_at IS NULL
               ORDER BY acquired_at, id
               LIMIT ?3
           )"#,
        params![now_ms, patient_id, count],
    )?;
    debug!(patient_id, consumed, "Consumed streak freeze tokens");
    Ok(())
}

/// Result of recording a qualifying activity
#[derive(Debug, Clone)]
pub struct StreakUpdate {
    pub transition: StreakTransition,
    pub current: u32,
    pub longest: u32,
    pub milestone: Option<StreakMilestone>,
}

/// Apply a qualifying activity on `day_key` to the patient's streak
///
/// Runs inside the caller's transaction, together with the milestone bonus.
pub fn record_activity(
    conn: &Connection,
    rules: &Rules,
    patient_id: &str,
    day_key: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<StreakUpdate> {
    let profile = ledger::load_profile(conn, patient_id)?
        .ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))?;
    let tokens = available_freeze_tokens(conn, patient_id)?;
    let step = next_streak(
        profile.current_streak,
        profile.last_activity_day.as_deref(),
        day_key,
        tokens,
    );

    if step.transition == StreakTransition::Unchanged {
        return Ok(StreakUpdate {
            transition: step.transition,
            current: profile.current_streak,
            longest: profile.longest_streak,
            milestone: None,
        });
    }

    if let StreakTransition::Frozen { tokens_used } = step.transition {
        consume_freeze_tokens(conn, patient_id, tokens_used, now_ms)?;
        info!(patient_id, tokens_used, "Streak preserved by freeze tokens");
    }

    let longest = profile.longest_streak.max(step.current);
    conn.execute(
        r#"UPDATE profiles
           SET current_streak = ?1, longest_streak = ?2, last_activity_day = ?3,
               last_activity_at = ?4, updated_at = ?4
           WHERE patient_id = ?5"#,
        params![step.current, longest, day_key, now_ms, patient_id],
    )?;

    let milestone = rules.config.streak.milestone_at(step.current).cloned();
    if let Some(m) = &milestone {
        let description = format!("{}-day streak", step.current);
        ledger::credit_both(
            conn,
            &rules.levels,
            patient_id,
            m.xp,
            m.points,
            LedgerReason::StreakBonus,
            &description,
            now_ms,
            notes,
        )?;
        notes.push(Notification::StreakMilestone {
            patient_id: patient_id.to_string(),
            days: step.current,
            xp: m.xp,
            points: m.points,
        });
    }

    Ok(StreakUpdate {
        transition: step.transition,
        current: step.current,
        longest,
        milestone,
    })
}

/// Zero the current streak, keeping the longest
pub fn reset(conn: &Connection, patient_id: &str, now_ms: i64) -> EngineResult<()> {
    let updated = conn.execute(
        "UPDATE profiles SET current_streak = 0, updated_at = ?1 WHERE patient_id = ?2",
        params![now_ms, patient_id],
    )?;
    if updated == 0 {
        return Err(EngineError::ProfileNotFound(patient_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_activity_starts_streak() {
        let step = next_streak(0, None, "2026-10-19", 0);
        assert_eq!(step.transition, StreakTransition::Started);
        assert_eq!(step.current, 1);
    }

    #[test]
    fn test_same_day_is_unchanged() {
        let step = next_streak(4, Some("2026-10-19"), "2026-10-19", 0);
        assert_eq!(step.transition, StreakTransition::Unchanged);
        assert_eq!(step.current, 4);
    }

    #[test]
    fn test_consecutive_day_extends() {
        let step = next_streak(4, Some("2026-10-18"), "2026-10-19", 0);
        assert_eq!(step.transition, StreakTransition::Extended);
        assert_eq!(step.current, 5);
    }

    #[test]
    fn test_gap_resets_without_tokens() {
        let step = next_streak(2, Some("2026-10-17"), "2026-10-19", 0);
        assert_eq!(step.transition, StreakTransition::Reset);
        assert_eq!(step.current, 1);
    }

    #[test]
    fn test_gap_bridged_by_tokens() {
        let step = next_streak(2, Some("2026-10-16"), "2026-10-19", 2);
        assert_eq!(step.transition, StreakTransition::Frozen { tokens_used: 2 });
        assert_eq!(step.current, 3);

        let step = next_streak(2, Some("2026-10-16"), "2026-10-19", 1);
        assert_eq!(step.transition, StreakTransition::Reset);
    }

    #[test]
    fn test_earlier_day_does_not_move_streak() {
        let step = next_streak(3, Some("2026-10-19"), "2026-10-10", 0);
        assert_eq!(step.transition, StreakTransition::Unchanged);
        assert_eq!(step.current, 3);
    }

    #[test]
    fn test_projection() {
        assert_eq!(project_current(5, Some("2026-10-18"), "2026-10-19", 0), 5);
        assert_eq!(project_current(5, Some("2026-10-16"), "2026-10-19", 0), 0);
        assert_eq!(project_current(5, Some("2026-10-16"), "2026-10-19", 2), 5);
        assert_eq!(project_current(0, None, "2026-10-19", 3), 0);
    }
}
