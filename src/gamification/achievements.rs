//! Achievement evaluation
//!
//! Rules are data (`UnlockRule`) checked against a `StatsSnapshot`. The
//! `(patient_id, achievement_id)` primary key makes unlocking exactly-once:
//! the bonus is only credited by the caller whose insert changed a row.

use rusqlite::{Connection, Row, params};
use tracing::{info, warn};

use super::stats::{self, StatsSnapshot};
use super::{Rules, ledger};
use crate::domain::{Achievement, LedgerReason, UnlockRule, UnlockedAchievement};
use crate::error::{EngineError, EngineResult};
use crate::notify::Notification;

/// Nesting limit for `all_of` / `any_of`
const MAX_RULE_DEPTH: usize = 8;

/// Check one rule against a snapshot
///
/// Returns an error message for rules that can never be decided (empty
/// groups, runaway nesting).
pub fn rule_matches(rule: &UnlockRule, stats: &StatsSnapshot) -> Result<bool, String> {
    matches_at(rule, stats, 0)
}

fn matches_at(rule: &UnlockRule, stats: &StatsSnapshot, depth: usize) -> Result<bool, String> {
    if depth > MAX_RULE_DEPTH {
        return Err(format!("rule nested deeper than {MAX_RULE_DEPTH} levels"));
    }
    let met = match rule {
        UnlockRule::TotalXpAtLeast { xp } => stats.total_xp >= *xp,
        UnlockRule::LevelAtLeast { level } => stats.level >= *level,
        UnlockRule::StreakAtLeast { days } => stats.current_streak >= *days,
        UnlockRule::LongestStreakAtLeast { days } => stats.longest_streak >= *days,
        UnlockRule::EventCountAtLeast { event_type, count } => {
            if event_type.is_empty() {
                return Err("event_count_at_least without event_type".to_string());
            }
            stats.event_count(event_type) >= *count
        }
        UnlockRule::QuestsClaimedAtLeast { count } => stats.quests_claimed >= *count,
        UnlockRule::RedemptionsAtLeast { count } => stats.redemptions >= *count,
        UnlockRule::AllOf { rules } => {
            if rules.is_empty() {
                return Err("empty all_of group".to_string());
            }
            for r in rules {
                if !matches_at(r, stats, depth + 1)? {
                    return Ok(false);
                }
            }
            true
        }
        UnlockRule::AnyOf { rules } => {
            if rules.is_empty() {
                return Err("empty any_of group".to_string());
            }
            for r in rules {
                if matches_at(r, stats, depth + 1)? {
                    return Ok(true);
                }
            }
            false
        }
    };
    Ok(met)
}

/// Catalog row; `achievement` is None when its rule JSON does not decode
struct StoredAchievement {
    achievement: Option<Achievement>,
    code: String,
    decode_error: Option<String>,
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredAchievement> {
    let code: String = row.get(1)?;
    let rule_json: String = row.get(6)?;
    let mut out = StoredAchievement {
        achievement: None,
        code: code.clone(),
        decode_error: None,
    };
    match serde_json::from_str::<UnlockRule>(&rule_json) {
        Ok(unlock_rule) => {
            out.achievement = Some(Achievement {
                id: row.get(0)?,
                code,
                title: row.get(2)?,
                description: row.get(3)?,
                xp_reward: row.get(4)?,
                points_reward: row.get(5)?,
                unlock_rule,
                active: row.get(7)?,
            })
        }
        Err(e) => out.decode_error = Some(e.to_string()),
    }
    Ok(out)
}

const ACHIEVEMENT_COLUMNS: &str =
    "id, code, title, description, xp_reward, points_reward, unlock_rule, active";

/// Catalog achievements, optionally including inactive ones
pub fn catalog(conn: &Connection, include_inactive: bool) -> EngineResult<Vec<Achievement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE active = 1 OR ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([include_inactive], stored_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().filter_map(|s| s.achievement).collect())
}

/// Unlocked achievements for a patient, oldest first
pub fn unlocked(conn: &Connection, patient_id: &str) -> EngineResult<Vec<UnlockedAchievement>> {
    let mut stmt = conn.prepare(
        r#"SELECT u.patient_id, a.id, a.code, a.title, a.xp_reward, u.unlocked_at
           FROM unlocked_achievements u JOIN achievements a ON a.id = u.achievement_id
           WHERE u.patient_id = ?1
           ORDER BY u.unlocked_at, a.id"#,
    )?;
    let rows = stmt
        .query_map([patient_id], |r| {
            Ok(UnlockedAchievement {
                patient_id: r.get(0)?,
                achievement_id: r.get(1)?,
                code: r.get(2)?,
                title: r.get(3)?,
                xp_reward: r.get(4)?,
                unlocked_at: r.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Outcome of one evaluation pass
#[derive(Debug, Default)]
pub struct EvaluationReport {
    pub unlocked: Vec<UnlockedAchievement>,
    /// Rules that could not be decided; other achievements were still evaluated
    pub failures: Vec<EngineError>,
}

/// Evaluate all locked, active achievements for a patient
///
/// Unlock bonuses can push the patient over further thresholds, so the pass
/// repeats until nothing new unlocks.
pub fn evaluate(
    conn: &Connection,
    rules: &Rules,
    patient_id: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<EvaluationReport> {
    let today = rules.day_key(now_ms);
    let mut report = EvaluationReport::default();

    let mut stmt = conn.prepare(&format!(
        r#"SELECT {ACHIEVEMENT_COLUMNS} FROM achievements a
           WHERE a.active = 1 AND NOT EXISTS (
               SELECT 1 FROM unlocked_achievements u
               WHERE u.patient_id = ?1 AND u.achievement_id = a.id
           )
           ORDER BY a.id"#
    ))?;
    let mut candidates = stmt
        .query_map([patient_id], stored_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    for stored in candidates.iter().filter(|s| s.decode_error.is_some()) {
        let message = stored.decode_error.clone().unwrap_or_default();
        warn!(code = %stored.code, %message, "Undecodable achievement rule");
        report.failures.push(EngineError::AchievementRuleEvaluationFailure {
            code: stored.code.clone(),
            message,
        });
    }
    candidates.retain(|s| s.achievement.is_some());

    loop {
        let snapshot = stats::load(conn, rules, patient_id, &today)?;
        let mut progressed = false;

        let mut remaining = Vec::with_capacity(candidates.len());
        for stored in candidates {
            let Some(achievement) = &stored.achievement else {
                continue;
            };
            match rule_matches(&achievement.unlock_rule, &snapshot) {
                Ok(true) => {
                    if let Some(unlock) = unlock(conn, rules, patient_id, achievement, now_ms, notes)? {
                        report.unlocked.push(unlock);
                        progressed = true;
                    }
                }
                Ok(false) => remaining.push(stored),
                Err(message) => {
                    warn!(code = %achievement.code, %message, "Achievement rule evaluation failed");
                    report.failures.push(EngineError::AchievementRuleEvaluationFailure {
                        code: achievement.code.clone(),
                        message,
                    });
                }
            }
        }
        candidates = remaining;

        if !progressed || candidates.is_empty() {
            break;
        }
    }

    Ok(report)
}

/// Insert the unlock row and credit its bonus if this call created the row
fn unlock(
    conn: &Connection,
    rules: &Rules,
    patient_id: &str,
    achievement: &Achievement,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<Option<UnlockedAchievement>> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO unlocked_achievements (patient_id, achievement_id, unlocked_at) VALUES (?1, ?2, ?3)",
        params![patient_id, achievement.id, now_ms],
    )?;
    if inserted == 0 {
        return Ok(None);
    }

    let description = format!("Achievement: {}", achievement.title);
    ledger::credit_both(
        conn,
        &rules.levels,
        patient_id,
        achievement.xp_reward,
        achievement.points_reward,
        LedgerReason::AchievementUnlock,
        &description,
        now_ms,
        notes,
    )?;

    info!(patient_id, code = %achievement.code, "Achievement unlocked");
    notes.push(Notification::AchievementUnlocked {
        patient_id: patient_id.to_string(),
        code: achievement.code.clone(),
        title: achievement.title.clone(),
        xp_reward: achievement.xp_reward,
    });

    Ok(Some(UnlockedAchievement {
        patient_id: patient_id.to_string(),
        achievement_id: achievement.id,
        code: achievement.code.clone(),
        title: achievement.title.clone(),
        xp_reward: achievement.xp_reward,
        unlocked_at: now_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatsSnapshot {
        let mut stats = StatsSnapshot {
            total_xp: 450,
            level: 3,
            current_streak: 2,
            longest_streak: 7,
            quests_claimed: 1,
            ..Default::default()
        };
        stats.event_counts.insert("session_completed".to_string(), 10);
        stats
    }

    #[test]
    fn test_simple_rules() {
        let stats = snapshot();
        assert_eq!(rule_matches(&UnlockRule::TotalXpAtLeast { xp: 450 }, &stats), Ok(true));
        assert_eq!(rule_matches(&UnlockRule::LevelAtLeast { level: 4 }, &stats), Ok(false));
        assert_eq!(rule_matches(&UnlockRule::StreakAtLeast { days: 3 }, &stats), Ok(false));
        assert_eq!(rule_matches(&UnlockRule::LongestStreakAtLeast { days: 7 }, &stats), Ok(true));
        assert_eq!(rule_matches(&UnlockRule::RedemptionsAtLeast { count: 1 }, &stats), Ok(false));
    }

    #[test]
    fn test_event_counts() {
        let stats = snapshot();
        let ten = UnlockRule::EventCountAtLeast {
            event_type: "session_completed".to_string(),
            count: 10,
        };
        let goal = UnlockRule::EventCountAtLeast {
            event_type: "goal_achieved".to_string(),
            count: 1,
        };
        assert_eq!(rule_matches(&ten, &stats), Ok(true));
        assert_eq!(rule_matches(&goal, &stats), Ok(false));
    }

    #[test]
    fn test_groups() {
        let stats = snapshot();
        let all = UnlockRule::AllOf {
            rules: vec![
                UnlockRule::LevelAtLeast { level: 3 },
                UnlockRule::QuestsClaimedAtLeast { count: 1 },
            ],
        };
        let any = UnlockRule::AnyOf {
            rules: vec![
                UnlockRule::LevelAtLeast { level: 10 },
                UnlockRule::StreakAtLeast { days: 1 },
            ],
        };
        assert_eq!(rule_matches(&all, &stats), Ok(true));
        assert_eq!(rule_matches(&any, &stats), Ok(true));
    }

    #[test]
    fn test_empty_group_fails() {
        let stats = snapshot();
        assert!(rule_matches(&UnlockRule::AllOf { rules: vec![] }, &stats).is_err());
        let nested = UnlockRule::AnyOf {
            rules: vec![UnlockRule::AnyOf { rules: vec![] }],
        };
        assert!(rule_matches(&nested, &stats).is_err());
    }
}
