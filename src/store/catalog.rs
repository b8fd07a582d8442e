//! Sync externally supplied reference data into the store

use rusqlite::{Connection, params};

use super::EngineDb;
use crate::config::EngineConfig;
use crate::error::EngineResult;

impl EngineDb {
    /// Upsert achievements, quest definitions and rewards from config
    ///
    /// Rows missing from the config are deactivated, never deleted, since
    /// unlocks, quest instances and redemptions keep referencing them.
    /// Reward stock is only seeded on first insert.
    pub fn sync_catalog(&self, config: &EngineConfig) -> EngineResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        sync_achievements(&tx, config)?;
        sync_quests(&tx, config)?;
        sync_rewards(&tx, config)?;
        tx.commit()?;
        Ok(())
    }
}

fn sync_achievements(conn: &Connection, config: &EngineConfig) -> EngineResult<()> {
    conn.execute("UPDATE achievements SET active = 0", [])?;
    for a in &config.achievements {
        let rule = serde_json::to_string(&a.unlock_rule)?;
        conn.execute(
            r#"INSERT INTO achievements (code, title, description, xp_reward, points_reward, unlock_rule, active)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(code) DO UPDATE SET
                   title = ?2, description = ?3, xp_reward = ?4, points_reward = ?5,
                   unlock_rule = ?6, active = ?7"#,
            params![a.code, a.title, a.description, a.xp_reward, a.points_reward, rule, a.active],
        )?;
    }
    Ok(())
}

fn sync_quests(conn: &Connection, config: &EngineConfig) -> EngineResult<()> {
    conn.execute("UPDATE quest_definitions SET active = 0", [])?;
    for q in &config.quests {
        conn.execute(
            r#"INSERT INTO quest_definitions
                   (id, title, description, category, difficulty, target_event_type, target_count,
                    xp_reward, points_reward, active, starts_at, ends_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
               ON CONFLICT(id) DO UPDATE SET
                   title = ?2, description = ?3, category = ?4, difficulty = ?5,
                   target_event_type = ?6, target_count = ?7, xp_reward = ?8,
                   points_reward = ?9, active = ?10, starts_at = ?11, ends_at = ?12"#,
            params![
                q.id,
                q.title,
                q.description,
                q.category.as_str(),
                q.difficulty.as_str(),
                q.target.event_type,
                q.target.count,
                q.xp_reward,
                q.points_reward,
                q.active,
                q.starts_at.map(|t| t.timestamp_millis()),
                q.ends_at.map(|t| t.timestamp_millis()),
            ],
        )?;
    }
    Ok(())
}

fn sync_rewards(conn: &Connection, config: &EngineConfig) -> EngineResult<()> {
    conn.execute("UPDATE rewards SET active = 0", [])?;
    for r in &config.rewards {
        conn.execute(
            r#"INSERT INTO rewards (id, title, description, point_cost, stock, category, kind, active)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT(id) DO UPDATE SET
                   title = ?2, description = ?3, point_cost = ?4, category = ?6,
                   kind = ?7, active = ?8"#,
            params![
                r.id,
                r.title,
                r.description,
                r.point_cost,
                r.stock,
                r.category,
                r.kind.as_str(),
                r.active,
            ],
        )?;
    }
    Ok(())
}
