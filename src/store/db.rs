//! SQLite database connection and schema management
//!
//! Manages the engine database with automatic schema migration.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper shared by all engine components
///
/// File databases get a second, query-only connection so reads run beside an
/// open write transaction (WAL). In-memory databases share one connection.
#[derive(Clone)]
pub struct EngineDb {
    conn: Arc<Mutex<Connection>>,
    reader: Option<Arc<Mutex<Connection>>>,
}

impl EngineDb {
    /// Open or create the engine database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open engine db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut db = Self::from_connection(conn)?;

        let reader = Connection::open(path)
            .with_context(|| format!("Failed to open read connection: {}", path.display()))?;
        reader.pragma_update(None, "query_only", "ON")?;
        reader.busy_timeout(BUSY_TIMEOUT)?;
        db.reader = Some(Arc::new(Mutex::new(reader)));

        Ok(db)
    }

    /// In-memory database (nothing survives the process)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            reader: None,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Lock the connection
    ///
    /// Always the innermost lock: never acquire a patient or reward lock while
    /// holding this guard.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back on drop, so the
        // connection is still consistent after poisoning.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the read connection (the write connection for in-memory dbs)
    ///
    /// Sees committed data only. Same lock order rule as `conn`.
    pub fn read_conn(&self) -> MutexGuard<'_, Connection> {
        self.reader
            .as_ref()
            .unwrap_or(&self.conn)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to create engine schema")?;
        drop(conn);
        self.run_migrations()
    }

    /// Run any pending migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: redemption lookups by patient + reward for double-submit detection
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_redemption_patient_reward
                    ON redemptions(patient_id, reward_id, claimed_at);
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        Ok(())
    }
}

/// SQL schema for the engine database
const SCHEMA_SQL: &str = r#"
-- One row per patient; totals are a cache of ledger sums
CREATE TABLE IF NOT EXISTS profiles (
    patient_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL DEFAULT '',
    total_xp INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
    level INTEGER NOT NULL DEFAULT 1,
    current_streak INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
    longest_streak INTEGER NOT NULL DEFAULT 0 CHECK (longest_streak >= 0),
    total_points INTEGER NOT NULL DEFAULT 0 CHECK (total_points >= 0),
    last_activity_day TEXT,
    last_activity_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_profile_created ON profiles(created_at);

-- Append-only ledger: sole authority for XP and points
CREATE TABLE IF NOT EXISTS ledger_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    currency TEXT NOT NULL CHECK (currency IN ('xp', 'points')),
    amount INTEGER NOT NULL CHECK (amount <> 0),
    reason TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_patient ON ledger_entries(patient_id, currency);
CREATE INDEX IF NOT EXISTS idx_ledger_created ON ledger_entries(created_at);

-- Raw activity history (for rule counts)
CREATE TABLE IF NOT EXISTS activity_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    event_type TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,
    day_key TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT 'null'
);
CREATE INDEX IF NOT EXISTS idx_activity_patient_type ON activity_events(patient_id, event_type);

-- Achievement catalog
CREATE TABLE IF NOT EXISTS achievements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    xp_reward INTEGER NOT NULL DEFAULT 0 CHECK (xp_reward >= 0),
    points_reward INTEGER NOT NULL DEFAULT 0 CHECK (points_reward >= 0),
    unlock_rule TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

-- Unlocks: the unique pair is the exactly-once guard
CREATE TABLE IF NOT EXISTS unlocked_achievements (
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    achievement_id INTEGER NOT NULL REFERENCES achievements(id),
    unlocked_at INTEGER NOT NULL,
    PRIMARY KEY (patient_id, achievement_id)
);
CREATE INDEX IF NOT EXISTS idx_unlocked_at ON unlocked_achievements(unlocked_at);

-- Quest catalog
CREATE TABLE IF NOT EXISTS quest_definitions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL CHECK (category IN ('daily', 'weekly', 'special')),
    difficulty TEXT NOT NULL DEFAULT 'easy',
    target_event_type TEXT NOT NULL,
    target_count INTEGER NOT NULL CHECK (target_count > 0),
    xp_reward INTEGER NOT NULL DEFAULT 0,
    points_reward INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    starts_at INTEGER,
    ends_at INTEGER
);

-- Quest instances: one per patient, definition and period
CREATE TABLE IF NOT EXISTS patient_quests (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    quest_id TEXT NOT NULL REFERENCES quest_definitions(id),
    period_key TEXT NOT NULL,
    status TEXT NOT NULL,
    progress_current INTEGER NOT NULL DEFAULT 0,
    progress_target INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    completed_at INTEGER,
    claimed_at INTEGER,
    created_at INTEGER NOT NULL,
    UNIQUE (patient_id, quest_id, period_key)
);
CREATE INDEX IF NOT EXISTS idx_patient_quest_status ON patient_quests(patient_id, status);

-- Rewards shop
CREATE TABLE IF NOT EXISTS rewards (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    point_cost INTEGER NOT NULL CHECK (point_cost > 0),
    stock INTEGER CHECK (stock IS NULL OR stock >= 0),
    category TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL DEFAULT 'item',
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS redemptions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    reward_id TEXT NOT NULL REFERENCES rewards(id),
    points_spent INTEGER NOT NULL,
    ledger_entry_id TEXT NOT NULL UNIQUE REFERENCES ledger_entries(id),
    claimed_at INTEGER NOT NULL
);

-- Streak freeze inventory, consumed oldest first
CREATE TABLE IF NOT EXISTS freeze_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL REFERENCES profiles(patient_id),
    redemption_id TEXT REFERENCES redemptions(id),
    acquired_at INTEGER NOT NULL,
    consumed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_freeze_patient ON freeze_tokens(patient_id, consumed_at);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_and_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_engine.db");
        let db = EngineDb::open(&db_path).unwrap();

        let conn = db.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["profiles", "ledger_entries", "unlocked_achievements", "patient_quests", "redemptions"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_engine.db");
        drop(EngineDb::open(&db_path).unwrap());
        EngineDb::open(&db_path).unwrap();
    }

    #[test]
    fn test_read_runs_beside_open_write_transaction() {
        let dir = tempdir().unwrap();
        let db = EngineDb::open(&dir.path().join("test_engine.db")).unwrap();
        db.conn()
            .execute(
                "INSERT INTO profiles (patient_id, created_at, updated_at) VALUES ('p1', 0, 0)",
                [],
            )
            .unwrap();

        let reader = db.clone();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let count = {
            let mut conn = db.conn();
            let tx = conn.transaction().unwrap();
            tx.execute(
                "INSERT INTO profiles (patient_id, created_at, updated_at) VALUES ('p2', 0, 0)",
                [],
            )
            .unwrap();

            std::thread::spawn(move || {
                let count: i64 = reader
                    .read_conn()
                    .query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))
                    .unwrap();
                let _ = done_tx.send(count);
            });
            let count = done_rx.recv_timeout(Duration::from_secs(2));
            tx.commit().unwrap();
            count
        };

        // Uncommitted rows are invisible to the reader
        assert_eq!(count, Ok(1));
        let after: i64 = db
            .read_conn()
            .query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))
            .unwrap();
        assert_eq!(after, 2);
    }

    #[test]
    fn test_in_memory_reads_share_the_write_connection() {
        let db = EngineDb::open_in_memory().unwrap();
        assert!(db.reader.is_none());
        let tables: i64 = db
            .read_conn()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'profiles'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_ledger_rejects_zero_amount() {
        let db = EngineDb::open_in_memory().unwrap();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO profiles (patient_id, created_at, updated_at) VALUES ('p1', 0, 0)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO ledger_entries (id, patient_id, currency, amount, reason, created_at)
             VALUES ('e1', 'p1', 'xp', 0, 'manual_award', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
