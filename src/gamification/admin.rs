//! Practice-level engagement reporting and profile maintenance

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use super::{Rules, ledger, streaks};
use crate::error::{EngineError, EngineResult};

const DAY_MS: i64 = 86_400_000;

/// Patients without activity for longer than this are at risk
pub const AT_RISK_INACTIVE_DAYS: i64 = 7;

/// Aggregate engagement figures for the practice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementStats {
    pub total_patients: u64,
    /// Patients with activity inside the window
    pub active_patients: u64,
    pub active_last_7_days: u64,
    pub window_days: i64,
    /// Share of patients active inside the window, in percent
    pub engagement_rate: f64,
    /// Patients inactive for more than `AT_RISK_INACTIVE_DAYS`
    pub at_risk_count: u64,
    pub average_level: f64,
    pub average_streak: f64,
    pub xp_awarded: i64,
    pub points_awarded: i64,
    pub points_redeemed: i64,
    pub achievements_unlocked: u64,
    pub quests_claimed: u64,
    pub redemptions: u64,
}

/// Patient who used to be engaged and has gone quiet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtRiskPatient {
    pub patient_id: String,
    pub display_name: String,
    pub level: u32,
    pub longest_streak: u32,
    pub last_activity_day: Option<String>,
    pub days_inactive: i64,
}

/// Engagement over the last `window_days` days
pub fn engagement_stats(
    conn: &Connection,
    rules: &Rules,
    window_days: i64,
    now_ms: i64,
) -> EngineResult<EngagementStats> {
    let since = now_ms - window_days.max(0) * DAY_MS;
    let today = rules.day_key(now_ms);

    let mut stmt = conn.prepare(
        r#"SELECT p.total_xp, p.current_streak, p.last_activity_day,
                  (SELECT COUNT(*) FROM freeze_tokens f
                    WHERE f.patient_id = p.patient_id AND f.consumed_at IS NULL)
           FROM profiles p"#,
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, u32>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, u32>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let total_patients = rows.len() as u64;
    let (level_sum, streak_sum) = rows.iter().fold((0u64, 0u64), |(l, s), (xp, streak, last, tokens)| {
        let level = rules.levels.level_for(*xp).level;
        let current = streaks::project_current(*streak, last.as_deref(), &today, *tokens);
        (l + u64::from(level), s + u64::from(current))
    });
    let average = |sum: u64| {
        if total_patients == 0 {
            0.0
        } else {
            sum as f64 / total_patients as f64
        }
    };

    let active_since = |from: i64| -> rusqlite::Result<u64> {
        conn.query_row(
            "SELECT COUNT(DISTINCT patient_id) FROM activity_events WHERE occurred_at >= ?1",
            [from],
            |r| r.get(0),
        )
    };
    let active_patients = active_since(since)?;
    let active_last_7_days = active_since(now_ms - 7 * DAY_MS)?;
    let at_risk_count = rows
        .iter()
        .filter(|(_, _, last, _)| is_at_risk(last.as_deref(), &today).is_some())
        .count() as u64;
    let sum = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [since], |r| r.get(0)) };
    let xp_awarded = sum("SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE currency = 'xp' AND created_at >= ?1")?;
    let points_awarded = sum(
        "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE currency = 'points' AND amount > 0 AND created_at >= ?1",
    )?;
    let points_redeemed = sum(
        "SELECT COALESCE(-SUM(amount), 0) FROM ledger_entries WHERE currency = 'points' AND amount < 0 AND created_at >= ?1",
    )?;
    let achievements_unlocked = sum("SELECT COUNT(*) FROM unlocked_achievements WHERE unlocked_at >= ?1")? as u64;
    let quests_claimed =
        sum("SELECT COUNT(*) FROM patient_quests WHERE status = 'claimed' AND claimed_at >= ?1")? as u64;
    let redemptions = sum("SELECT COUNT(*) FROM redemptions WHERE claimed_at >= ?1")? as u64;

    Ok(EngagementStats {
        total_patients,
        active_patients,
        active_last_7_days,
        window_days,
        engagement_rate: if total_patients == 0 {
            0.0
        } else {
            active_patients as f64 / total_patients as f64 * 100.0
        },
        at_risk_count,
        average_level: average(level_sum),
        average_streak: average(streak_sum),
        xp_awarded,
        points_awarded,
        points_redeemed,
        achievements_unlocked,
        quests_claimed,
        redemptions,
    })
}

/// Days since `last_day` when that exceeds the at-risk threshold
fn is_at_risk(last_day: Option<&str>, today: &str) -> Option<i64> {
    let days = super::calendar::days_between(last_day?, today)?;
    (days > AT_RISK_INACTIVE_DAYS).then_some(days)
}

/// Patients inactive for more than a week, longest inactive first
pub fn at_risk_patients(
    conn: &Connection,
    rules: &Rules,
    limit: usize,
    now_ms: i64,
) -> EngineResult<Vec<AtRiskPatient>> {
    let today = rules.day_key(now_ms);
    let mut stmt = conn.prepare(
        r#"SELECT patient_id, display_name, total_xp, longest_streak, last_activity_day
           FROM profiles
           WHERE last_activity_day IS NOT NULL
           ORDER BY last_activity_day, patient_id"#,
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, u32>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let at_risk = rows
        .into_iter()
        .filter_map(|(patient_id, display_name, xp, longest, last)| {
            let days_inactive = is_at_risk(last.as_deref(), &today)?;
            Some(AtRiskPatient {
                patient_id,
                display_name,
                level: rules.levels.level_for(xp).level,
                longest_streak: longest,
                last_activity_day: last,
                days_inactive,
            })
        })
        .take(limit)
        .collect();
    Ok(at_risk)
}

pub fn set_display_name(conn: &Connection, patient_id: &str, display_name: &str, now_ms: i64) -> EngineResult<()> {
    ledger::ensure_profile(conn, patient_id, now_ms)?;
    conn.execute(
        "UPDATE profiles SET display_name = ?1, updated_at = ?2 WHERE patient_id = ?3",
        params![display_name, now_ms, patient_id],
    )?;
    Ok(())
}

/// All patient ids, oldest profile first
pub fn patient_ids(conn: &Connection) -> EngineResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT patient_id FROM profiles ORDER BY created_at, patient_id")?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Fail with `ProfileNotFound` unless the patient has a profile
pub fn require_profile(conn: &Connection, patient_id: &str) -> EngineResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM profiles WHERE patient_id = ?1)",
        [patient_id],
        |r| r.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(EngineError::ProfileNotFound(patient_id.to_string()))
    }
}
