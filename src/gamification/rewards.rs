//! Rewards shop
//!
//! Redemption debits points, decrements stock and records the redemption in
//! one transaction. Every precondition is checked before the first write.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use super::{Rules, ledger, streaks};
use crate::domain::{Currency, LedgerReason, Redemption, Reward, RewardKind};
use crate::error::{EngineError, EngineResult};
use crate::notify::Notification;

const REWARD_COLUMNS: &str = "id, title, description, point_cost, stock, category, kind, active";

fn reward_from_row(row: &Row<'_>) -> rusqlite::Result<Reward> {
    let kind: String = row.get(6)?;
    Ok(Reward {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        point_cost: row.get(3)?,
        stock: row.get(4)?,
        category: row.get(5)?,
        kind: RewardKind::from_str(&kind).unwrap_or_default(),
        active: row.get(7)?,
    })
}

/// Active rewards, cheapest first
pub fn catalog(conn: &Connection) -> EngineResult<Vec<Reward>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REWARD_COLUMNS} FROM rewards WHERE active = 1 ORDER BY point_cost, id"
    ))?;
    let rewards = stmt
        .query_map([], reward_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rewards)
}

pub fn load(conn: &Connection, reward_id: &str) -> EngineResult<Option<Reward>> {
    let reward = conn
        .query_row(
            &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
            [reward_id],
            reward_from_row,
        )
        .optional()?;
    Ok(reward)
}

/// A committed redemption with the patient's remaining balance
#[derive(Debug, Clone)]
pub struct RedemptionReceipt {
    pub redemption: Redemption,
    pub reward: Reward,
    pub remaining_points: i64,
}

/// Redeem a reward for a patient
///
/// Checks, in order: reward exists and is active, no identical redemption
/// inside the duplicate window, balance covers the cost, stock remains.
pub fn redeem(
    conn: &Connection,
    rules: &Rules,
    patient_id: &str,
    reward_id: &str,
    now_ms: i64,
    notes: &mut Vec<Notification>,
) -> EngineResult<RedemptionReceipt> {
    let reward = load(conn, reward_id)?.ok_or_else(|| EngineError::UnknownReward(reward_id.to_string()))?;
    if !reward.active {
        return Err(EngineError::RewardInactive(reward.id));
    }

    let window_ms = (rules.config.redemption.duplicate_window_secs as i64).saturating_mul(1000);
    if window_ms > 0 {
        let recent: i64 = conn.query_row(
            "SELECT COUNT(*) FROM redemptions WHERE patient_id = ?1 AND reward_id = ?2 AND claimed_at > ?3",
            params![patient_id, reward_id, now_ms - window_ms],
            |r| r.get(0),
        )?;
        if recent > 0 {
            return Err(EngineError::DuplicateRedemption {
                patient_id: patient_id.to_string(),
                reward_id: reward_id.to_string(),
            });
        }
    }

    let balance = ledger::balance(conn, patient_id, Currency::Points)?;
    if balance < reward.point_cost {
        return Err(EngineError::InsufficientPoints {
            balance,
            required: reward.point_cost,
        });
    }

    if reward.stock == Some(0) {
        return Err(EngineError::RewardOutOfStock(reward.id));
    }

    let description = format!("Redeemed: {}", reward.title);
    let debit = ledger::append(
        conn,
        &rules.levels,
        patient_id,
        Currency::Points,
        -reward.point_cost,
        LedgerReason::Redemption,
        &description,
        now_ms,
        notes,
    )?;

    if reward.stock.is_some() {
        let taken = conn.execute(
            "UPDATE rewards SET stock = stock - 1 WHERE id = ?1 AND stock > 0",
            [&reward.id],
        )?;
        if taken == 0 {
            return Err(EngineError::RewardOutOfStock(reward.id));
        }
    }

    let redemption = Redemption {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: patient_id.to_string(),
        reward_id: reward.id.clone(),
        points_spent: reward.point_cost,
        ledger_entry_id: debit.entry.id.clone(),
        claimed_at: now_ms,
    };
    conn.execute(
        r#"INSERT INTO redemptions (id, patient_id, reward_id, points_spent, ledger_entry_id, claimed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            redemption.id,
            redemption.patient_id,
            redemption.reward_id,
            redemption.points_spent,
            redemption.ledger_entry_id,
            now_ms,
        ],
    )?;

    if reward.kind == RewardKind::StreakFreeze {
        streaks::grant_freeze_token(conn, patient_id, Some(&redemption.id), now_ms)?;
    }

    info!(patient_id, reward_id = %reward.id, points = reward.point_cost, "Reward redeemed");
    notes.push(Notification::RewardRedeemed {
        patient_id: patient_id.to_string(),
        reward_id: reward.id.clone(),
        title: reward.title.clone(),
        points_spent: reward.point_cost,
    });

    let reward = load(conn, reward_id)?.unwrap_or(reward);
    Ok(RedemptionReceipt {
        redemption,
        reward,
        remaining_points: debit.profile.total_points,
    })
}

/// Redemption history for a patient, newest first
pub fn redemptions(conn: &Connection, patient_id: &str) -> EngineResult<Vec<Redemption>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, patient_id, reward_id, points_spent, ledger_entry_id, claimed_at
           FROM redemptions WHERE patient_id = ?1 ORDER BY claimed_at DESC, id"#,
    )?;
    let rows = stmt
        .query_map([patient_id], |r| {
            Ok(Redemption {
                id: r.get(0)?,
                patient_id: r.get(1)?,
                reward_id: r.get(2)?,
                points_spent: r.get(3)?,
                ledger_entry_id: r.get(4)?,
                claimed_at: r.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Add stock to a finite reward; unlimited rewards are left as they are
pub fn restock(conn: &Connection, reward_id: &str, amount: i64) -> EngineResult<Reward> {
    if amount <= 0 {
        return Err(EngineError::InvalidConfig(format!(
            "restock amount must be positive, got {amount}"
        )));
    }
    let updated = conn.execute(
        "UPDATE rewards SET stock = stock + ?1 WHERE id = ?2 AND stock IS NOT NULL",
        params![amount, reward_id],
    )?;
    let reward = load(conn, reward_id)?.ok_or_else(|| EngineError::UnknownReward(reward_id.to_string()))?;
    if updated > 0 {
        info!(reward_id, amount, stock = ?reward.stock, "Reward restocked");
    }
    Ok(reward)
}
