//! Event Ledger
//!
//! Append-only log of point-affecting entries. `append` is the only write
//! path for `total_xp` / `total_points`: it inserts the entry and rewrites
//! the profile cache from the ledger sums inside the caller's transaction,
//! so the two can never diverge.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::levels::LevelTable;
use crate::domain::{Currency, GamificationProfile, LedgerEntry, LedgerReason};
use crate::error::{EngineError, EngineResult};
use crate::notify::Notification;

/// Result of a ledger append: the new entry plus the updated profile
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub entry: LedgerEntry,
    pub profile: GamificationProfile,
}

/// Zero is never allowed; negative only for redemptions
pub fn validate_amount(currency: Currency, amount: i64, reason: LedgerReason) -> EngineResult<()> {
    let valid = match reason {
        LedgerReason::Redemption => amount != 0,
        _ => amount > 0,
    };
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidLedgerAmount {
            amount,
            currency,
            reason,
        })
    }
}

pub(crate) const PROFILE_COLUMNS: &str = "patient_id, display_name, total_xp, level, current_streak, \
     longest_streak, total_points, last_activity_day, created_at, updated_at";

pub(crate) fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<GamificationProfile> {
    Ok(GamificationProfile {
        patient_id: row.get(0)?,
        display_name: row.get(1)?,
        total_xp: row.get(2)?,
        level: row.get(3)?,
        current_streak: row.get(4)?,
        longest_streak: row.get(5)?,
        total_points: row.get(6)?,
        last_activity_day: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn load_profile(conn: &Connection, patient_id: &str) -> EngineResult<Option<GamificationProfile>> {
    let profile = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE patient_id = ?1"),
            [patient_id],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

/// Load the profile, creating an empty one on first contact
pub fn ensure_profile(conn: &Connection, patient_id: &str, now_ms: i64) -> EngineResult<GamificationProfile> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO profiles (patient_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![patient_id, now_ms],
    )?;
    if inserted > 0 {
        debug!(patient_id, "Created gamification profile");
    }
    load_profile(conn, patient_id)?.ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))
}

/// Sum of all entries of one currency for a patient
pub fn balance(conn: &Connection, patient_id: &str, currency: Currency) -> EngineResult<i64> {
    let sum: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE patient_id = ?1 AND currency = ?2",
        params![patient_id, currency.as_str()],
        |r| r.get(0),
    )?;
    Ok(sum)
}

/// Append one entry and refresh the profile cache
///
/// Must run inside a transaction: on any error the caller drops it and
/// neither the entry nor the cache update survives.
#[allow(clippy::too_many_arguments)]
pub fn append(
    conn: &Connection,
    levels: &LevelTable,
    patient_id: &str,
    currency: Currency,
    amount: i64,
    reason: LedgerReason,
    description: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<AppendOutcome> {
    validate_amount(currency, amount, reason)?;
    let before = ensure_profile(conn, patient_id, now_ms)?;

    let entry = LedgerEntry {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: patient_id.to_string(),
        currency,
        amount,
        reason,
        description: description.to_string(),
        created_at: now_ms,
    };
    conn.execute(
        r#"INSERT INTO ledger_entries (id, patient_id, currency, amount, reason, description, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            entry.id,
            entry.patient_id,
            currency.as_str(),
            amount,
            reason.as_str(),
            entry.description,
            now_ms,
        ],
    )?;

    let total = balance(conn, patient_id, currency)?;
    match currency {
        Currency::Xp => {
            let level = levels.level_for(total).level;
            conn.execute(
                "UPDATE profiles SET total_xp = ?1, level = ?2, updated_at = ?3 WHERE patient_id = ?4",
                params![total, level, now_ms, patient_id],
            )?;
            if level > before.level {
                notes.push(Notification::LevelUp {
                    patient_id: patient_id.to_string(),
                    old_level: before.level,
                    new_level: level,
                });
            }
        }
        Currency::Points => {
            if total < 0 {
                return Err(EngineError::InsufficientPoints {
                    balance: before.total_points,
                    required: -amount,
                });
            }
            conn.execute(
                "UPDATE profiles SET total_points = ?1, updated_at = ?2 WHERE patient_id = ?3",
                params![total, now_ms, patient_id],
            )?;
        }
    }

    let profile = load_profile(conn, patient_id)?
        .ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))?;
    debug!(
        patient_id,
        currency = currency.as_str(),
        amount,
        reason = reason.as_str(),
        "Ledger entry appended"
    );
    Ok(AppendOutcome { entry, profile })
}

/// Append XP and points credits for the same cause, skipping zero amounts
#[allow(clippy::too_many_arguments)]
pub fn credit_both(
    conn: &Connection,
    levels: &LevelTable,
    patient_id: &str,
    xp: i64,
    points: i64,
    reason: LedgerReason,
    description: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<Vec<LedgerEntry>> {
    let mut entries = Vec::new();
    if xp != 0 {
        let out = append(conn, levels, patient_id, Currency::Xp, xp, reason, description, now_ms, notes)?;
        entries.push(out.entry);
    }
    if points != 0 {
        let out = append(
            conn,
            levels,
            patient_id,
            Currency::Points,
            points,
            reason,
            description,
            now_ms,
            notes,
        )?;
        entries.push(out.entry);
    }
    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let currency: String = row.get(2)?;
    let reason: String = row.get(4)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        currency: Currency::from_str(&currency).unwrap_or(Currency::Xp),
        amount: row.get(3)?,
        reason: LedgerReason::from_str(&reason).unwrap_or(LedgerReason::ManualAward),
        description: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Most recent entries first
pub fn history(conn: &Connection, patient_id: &str, limit: usize) -> EngineResult<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, patient_id, currency, amount, reason, description, created_at
           FROM ledger_entries WHERE patient_id = ?1
           ORDER BY seq DESC LIMIT ?2"#,
    )?;
    let entries = stmt
        .query_map(params![patient_id, limit as i64], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
