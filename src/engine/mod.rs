//! Gamification engine facade
//!
//! `Engine` is cheap to clone and safe to share across threads. Every
//! mutation for a patient runs under that patient's lock; redemptions also
//! take the reward's lock. Writes go through one SQLite transaction per step
//! and notifications are published only after the step commits.

mod clock;
mod commands;
mod events;
mod locks;
mod queries;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{ClaimOutcome, RedeemOutcome};
pub use events::EventOutcome;
pub use locks::KeyedLocks;
pub use queries::{AchievementsView, ProfileView};
pub use scheduler::{RolloverReport, run_scheduler};

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::domain::{GamificationProfile, UnlockedAchievement};
use crate::error::{EngineError, EngineResult};
use crate::gamification::leaderboard::LeaderboardCache;
use crate::gamification::{Rules, achievements, ledger};
use crate::notify::{Notification, Outbox};
use crate::store::EngineDb;

struct Inner {
    db: EngineDb,
    rules: Rules,
    clock: Arc<dyn Clock>,
    patient_locks: KeyedLocks,
    reward_locks: KeyedLocks,
    outbox: Outbox,
    leaderboard: LeaderboardCache,
    /// Patients whose achievement evaluation failed and must be retried
    pending_evaluations: Mutex<BTreeSet<String>>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Open the engine on the configured database with the wall clock
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db = EngineDb::open(&config.database_path())?;
        Self::with_db(config, db, Arc::new(SystemClock))
    }

    /// Build an engine on an existing store
    ///
    /// Validates the config and syncs its catalogs into the store.
    pub fn with_db(config: EngineConfig, db: EngineDb, clock: Arc<dyn Clock>) -> Result<Self> {
        let rules = Rules::new(config)?;
        db.sync_catalog(&rules.config)?;
        let ttl = Duration::from_secs(rules.config.leaderboard.cache_ttl_secs);
        info!(
            max_level = rules.levels.max_level(),
            achievements = rules.config.achievements.len(),
            quests = rules.config.quests.len(),
            rewards = rules.config.rewards.len(),
            "Gamification engine ready"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                rules,
                clock,
                patient_locks: KeyedLocks::default(),
                reward_locks: KeyedLocks::default(),
                outbox: Outbox::default(),
                leaderboard: LeaderboardCache::new(ttl),
                pending_evaluations: Mutex::new(BTreeSet::new()),
            }),
        })
    }

    pub fn rules(&self) -> &Rules {
        &self.inner.rules
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    pub fn db(&self) -> &EngineDb {
        &self.inner.db
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    /// Run `f` in one transaction; publish its notifications after commit
    fn transact<T>(&self, f: impl FnOnce(&Connection, &mut Vec<Notification>) -> EngineResult<T>) -> EngineResult<T> {
        let mut notes = Vec::new();
        let value = {
            let mut conn = self.inner.db.conn();
            let tx = conn.transaction()?;
            let value = f(&tx, &mut notes)?;
            tx.commit()?;
            value
        };
        self.inner.outbox.publish(notes);
        Ok(value)
    }

    /// Run a read against committed state on the read connection
    fn read<T>(&self, f: impl FnOnce(&Connection) -> EngineResult<T>) -> EngineResult<T> {
        let conn = self.inner.db.read_conn();
        f(&conn)
    }

    /// Profile as stored, without read-time streak projection
    fn stored_profile(&self, patient_id: &str) -> EngineResult<GamificationProfile> {
        self.read(|conn| {
            ledger::load_profile(conn, patient_id)?
                .ok_or_else(|| EngineError::ProfileNotFound(patient_id.to_string()))
        })
    }

    /// Evaluate achievements for a patient after a ledger change
    ///
    /// Never fails the caller: errors are logged and the patient is queued
    /// for `retry_pending_evaluations`. Caller holds the patient lock.
    fn evaluate_achievements(&self, patient_id: &str, now_ms: i64) -> Vec<UnlockedAchievement> {
        let rules = &self.inner.rules;
        match self.transact(|conn, notes| achievements::evaluate(conn, rules, patient_id, now_ms, notes)) {
            Ok(report) => {
                if !report.failures.is_empty() {
                    self.queue_evaluation(patient_id);
                }
                report.unlocked
            }
            Err(e) => {
                warn!(patient_id, error = %e, "Achievement evaluation failed, queued for retry");
                self.queue_evaluation(patient_id);
                Vec::new()
            }
        }
    }

    fn queue_evaluation(&self, patient_id: &str) {
        self.inner
            .pending_evaluations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(patient_id.to_string());
    }

    /// Patients waiting for an achievement re-evaluation
    pub fn pending_evaluations(&self) -> Vec<String> {
        self.inner
            .pending_evaluations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
