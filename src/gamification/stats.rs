//! Per-patient statistics snapshot used by achievement rules

use std::collections::HashMap;

use rusqlite::Connection;

use super::{Rules, ledger, streaks};
use crate::error::{EngineError, EngineResult};

/// Everything an unlock rule can look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_xp: i64,
    pub total_points: i64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Recorded activity events per event type
    pub event_counts: HashMap<String, u64>,
    pub quests_claimed: u64,
    pub redemptions: u64,
    pub achievements_unlocked: u64,
}

impl StatsSnapshot {
    pub fn event_count(&self, event_type: &str) -> u64 {
        self.event_counts.get(event_type).copied().unwrap_or(0)
    }
}

/// Load the snapshot from the committed state seen by `conn`
pub fn load(conn: &Connection, rules: &Rules, patient_id: &str, today: &str) -> EngineResult<StatsSnapshot> {
    let profile = ledger::load_profile(conn, patient_id)?
        .ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))?;
    let tokens = streaks::available_freeze_tokens(conn, patient_id)?;

    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*) FROM activity_events WHERE patient_id = ?1 GROUP BY event_type",
    )?;
    let event_counts = stmt
        .query_map([patient_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    let count = |sql: &str| -> rusqlite::Result<u64> { conn.query_row(sql, [patient_id], |r| r.get(0)) };
    let quests_claimed = count("SELECT COUNT(*) FROM patient_quests WHERE patient_id = ?1 AND status = 'claimed'")?;
    let redemptions = count("SELECT COUNT(*) FROM redemptions WHERE patient_id = ?1")?;
    let achievements_unlocked = count("SELECT COUNT(*) FROM unlocked_achievements WHERE patient_id = ?1")?;

    Ok(StatsSnapshot {
        total_xp: profile.total_xp,
        total_points: profile.total_points,
        level: rules.levels.level_for(profile.total_xp).level,
        current_streak: streaks::project_current(
            profile.current_streak,
            profile.last_activity_day.as_deref(),
            today,
            tokens,
        ),
        longest_streak: profile.longest_streak,
        event_counts,
        quests_claimed,
        redemptions,
        achievements_unlocked,
    })
}
