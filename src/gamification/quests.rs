//! Quest issuance, progress and claiming
//!
//! A quest instance is keyed by `(patient_id, quest_id, period_key)`; issuing
//! uses `INSERT OR IGNORE` on that key so rollover can run any number of times
//! for the same period.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::{Rules, calendar, ledger};
use crate::domain::{
    LedgerReason, PatientQuest, QuestCategory, QuestDefinition, QuestDifficulty, QuestProgress,
    QuestStatus, QuestTarget,
};
use crate::error::{EngineError, EngineResult};
use crate::notify::Notification;

/// Period a definition is issued for at `now_ms`, with its expiry
///
/// Special quests only have a period while their window is open.
pub fn current_period(def: &QuestDefinition, now_ms: i64, rules: &Rules) -> Option<(String, i64)> {
    match def.category {
        QuestCategory::Daily => Some((
            calendar::day_key(now_ms, rules.offset),
            calendar::end_of_day_ms(now_ms, rules.offset),
        )),
        QuestCategory::Weekly => Some((
            calendar::week_key(now_ms, rules.offset),
            calendar::end_of_week_ms(now_ms, rules.offset),
        )),
        QuestCategory::Special => {
            let starts = def.starts_at.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
            let ends = def.ends_at.map(|t| t.timestamp_millis())?;
            (starts <= now_ms && now_ms < ends).then(|| ("special".to_string(), ends))
        }
    }
}

fn millis_to_datetime(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// Active quest definitions from the catalog
pub fn definitions(conn: &Connection) -> EngineResult<Vec<QuestDefinition>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, title, description, category, difficulty, target_event_type, target_count,
                  xp_reward, points_reward, active, starts_at, ends_at
           FROM quest_definitions WHERE active = 1 ORDER BY id"#,
    )?;
    let defs = stmt
        .query_map([], |r| {
            let category: String = r.get(3)?;
            let difficulty: String = r.get(4)?;
            Ok(QuestDefinition {
                id: r.get(0)?,
                title: r.get(1)?,
                description: r.get(2)?,
                category: QuestCategory::from_str(&category).unwrap_or(QuestCategory::Daily),
                difficulty: QuestDifficulty::from_str(&difficulty).unwrap_or_default(),
                target: QuestTarget {
                    event_type: r.get(5)?,
                    count: r.get(6)?,
                },
                xp_reward: r.get(7)?,
                points_reward: r.get(8)?,
                active: r.get(9)?,
                starts_at: millis_to_datetime(r.get(10)?),
                ends_at: millis_to_datetime(r.get(11)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(defs)
}

/// Issue every current-period quest the patient does not have yet
///
/// Returns how many instances were created.
pub fn issue_current(conn: &Connection, rules: &Rules, patient_id: &str, now_ms: i64) -> EngineResult<usize> {
    let mut issued = 0;
    for def in definitions(conn)? {
        let Some((period_key, expires_at)) = current_period(&def, now_ms, rules) else {
            continue;
        };
        issued += conn.execute(
            r#"INSERT OR IGNORE INTO patient_quests
               (id, patient_id, quest_id, period_key, status, progress_current, progress_target,
                expires_at, created_at)
               VALUES (?1, ?2, ?3, ?4, 'not_started', 0, ?5, ?6, ?7)"#,
            params![
                uuid::Uuid::new_v4().to_string(),
                patient_id,
                def.id,
                period_key,
                def.target.count,
                expires_at,
                now_ms,
            ],
        )?;
    }
    if issued > 0 {
        debug!(patient_id, issued, "Issued quests");
    }
    Ok(issued)
}

/// Expire unfinished instances whose period has ended
///
/// Completed instances are left alone: they stay claimable.
pub fn expire_stale(conn: &Connection, patient_id: &str, now_ms: i64) -> EngineResult<usize> {
    let expired = conn.execute(
        r#"UPDATE patient_quests SET status = 'expired'
           WHERE patient_id = ?1 AND status IN ('not_started', 'in_progress') AND expires_at <= ?2"#,
        params![patient_id, now_ms],
    )?;
    if expired > 0 {
        debug!(patient_id, expired, "Expired quests");
    }
    Ok(expired)
}

const QUEST_SELECT: &str = r#"
    SELECT pq.id, pq.patient_id, pq.quest_id, d.title, d.category, pq.period_key, pq.status,
           pq.progress_current, pq.progress_target, d.xp_reward, d.points_reward,
           pq.expires_at, pq.completed_at, pq.claimed_at, pq.created_at
    FROM patient_quests pq JOIN quest_definitions d ON d.id = pq.quest_id
"#;

fn quest_from_row(row: &Row<'_>) -> rusqlite::Result<PatientQuest> {
    let category: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(PatientQuest {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        quest_id: row.get(2)?,
        title: row.get(3)?,
        category: QuestCategory::from_str(&category).unwrap_or(QuestCategory::Daily),
        period_key: row.get(5)?,
        status: QuestStatus::from_str(&status).unwrap_or(QuestStatus::Expired),
        progress: QuestProgress {
            current: row.get(7)?,
            target: row.get(8)?,
        },
        xp_reward: row.get(9)?,
        points_reward: row.get(10)?,
        expires_at: row.get(11)?,
        completed_at: row.get(12)?,
        claimed_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

pub fn load(conn: &Connection, quest_instance_id: &str) -> EngineResult<Option<PatientQuest>> {
    let quest = conn
        .query_row(&format!("{QUEST_SELECT} WHERE pq.id = ?1"), [quest_instance_id], quest_from_row)
        .optional()?;
    Ok(quest)
}

/// Quests relevant to the patient at `now_ms`
///
/// Current-period instances in any state plus completed ones awaiting a claim.
pub fn list(
    conn: &Connection,
    patient_id: &str,
    category: Option<QuestCategory>,
    now_ms: i64,
) -> EngineResult<Vec<PatientQuest>> {
    let mut stmt = conn.prepare(&format!(
        r#"{QUEST_SELECT}
           WHERE pq.patient_id = ?1
             AND (?2 IS NULL OR d.category = ?2)
             AND ((pq.expires_at > ?3 AND pq.status <> 'expired') OR pq.status = 'completed')
           ORDER BY pq.expires_at, d.id"#
    ))?;
    let quests = stmt
        .query_map(
            params![patient_id, category.map(|c| c.as_str()), now_ms],
            quest_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(quests)
}

/// Advance open quests targeting `event_type`
///
/// Returns instances that completed with this event.
pub fn record_progress(
    conn: &Connection,
    patient_id: &str,
    event_type: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<Vec<PatientQuest>> {
    let mut stmt = conn.prepare(&format!(
        r#"{QUEST_SELECT}
           WHERE pq.patient_id = ?1 AND d.target_event_type = ?2
             AND pq.status IN ('not_started', 'in_progress') AND pq.expires_at > ?3"#
    ))?;
    let open = stmt
        .query_map(params![patient_id, event_type, now_ms], quest_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let mut completed = Vec::new();
    for mut quest in open {
        quest.progress.current = (quest.progress.current + 1).min(quest.progress.target);
        if quest.progress.is_complete() {
            quest.status = QuestStatus::Completed;
            quest.completed_at = Some(now_ms);
        } else {
            quest.status = QuestStatus::InProgress;
        }
        conn.execute(
            "UPDATE patient_quests SET progress_current = ?1, status = ?2, completed_at = ?3 WHERE id = ?4",
            params![quest.progress.current, quest.status.as_str(), quest.completed_at, quest.id],
        )?;

        if quest.status == QuestStatus::Completed {
            info!(patient_id, quest_id = %quest.quest_id, period = %quest.period_key, "Quest completed");
            notes.push(Notification::QuestCompleted {
                patient_id: patient_id.to_string(),
                quest_id: quest.quest_id.clone(),
                title: quest.title.clone(),
            });
            completed.push(quest);
        }
    }
    Ok(completed)
}

/// Claim a completed quest and credit its rewards
pub fn claim(
    conn: &Connection,
    rules: &Rules,
    quest_instance_id: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<PatientQuest> {
    let mut quest =
        load(conn, quest_instance_id)?.ok_or_else(|| EngineError::UnknownQuest(quest_instance_id.to_string()))?;

    match quest.status {
        QuestStatus::Claimed => return Err(EngineError::QuestAlreadyClaimed(quest.id)),
        QuestStatus::Completed => {}
        status => {
            return Err(EngineError::QuestNotCompleted {
                id: quest.id,
                status,
            });
        }
    }

    let claimed = conn.execute(
        "UPDATE patient_quests SET status = 'claimed', claimed_at = ?1 WHERE id = ?2 AND status = 'completed'",
        params![now_ms, quest.id],
    )?;
    if claimed == 0 {
        return Err(EngineError::QuestAlreadyClaimed(quest.id));
    }

    let description = format!("Quest: {}", quest.title);
    ledger::credit_both(
        conn,
        &rules.levels,
        &quest.patient_id,
        quest.xp_reward,
        quest.points_reward,
        LedgerReason::QuestClaim,
        &description,
        now_ms,
        notes,
    )?;

    info!(patient_id = %quest.patient_id, quest_id = %quest.quest_id, "Quest claimed");
    quest.status = QuestStatus::Claimed;
    quest.claimed_at = Some(now_ms);
    Ok(quest)
}
