//! Shared test utilities for engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use tempfile::TempDir;

use physio_quest::config::{EventRule, StreakConfig};
use physio_quest::engine::EventOutcome;
use physio_quest::store::EngineDb;
use physio_quest::{
    Achievement, ActivityEvent, Clock, Engine, EngineConfig, LedgerReason, ManualClock, QuestCategory,
    QuestDefinition, QuestDifficulty, QuestTarget, Reward, RewardKind, UnlockRule,
};

/// 2026-10-19 (a Monday) 12:00:00 UTC
pub const MONDAY_NOON: i64 = 1_792_411_200_000;

pub struct TestEngine {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestEngine {
    /// Report an event at the clock's current time
    pub fn event(&self, patient: &str, event_type: &str) -> EventOutcome {
        self.try_event(patient, event_type).expect("report_event failed")
    }

    pub fn try_event(&self, patient: &str, event_type: &str) -> physio_quest::EngineResult<EventOutcome> {
        let ts = DateTime::from_timestamp_millis(self.clock.now_ms()).expect("valid timestamp");
        self.engine.report_event(&ActivityEvent::new(patient, event_type, ts))
    }

    /// Report an event carrying an explicit timestamp
    pub fn event_at(&self, patient: &str, event_type: &str, timestamp_ms: i64) -> EventOutcome {
        let ts = DateTime::from_timestamp_millis(timestamp_ms).expect("valid timestamp");
        self.engine
            .report_event(&ActivityEvent::new(patient, event_type, ts))
            .expect("report_event failed")
    }

    /// Run a scalar query against the engine database
    pub fn scalar(&self, sql: &str, patient: &str) -> i64 {
        let conn = self.engine.db().conn();
        conn.query_row(sql, [patient], |r| r.get(0)).expect("query failed")
    }

    pub fn ledger_sum(&self, patient: &str, currency: &str) -> i64 {
        let conn = self.engine.db().conn();
        conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE patient_id = ?1 AND currency = ?2",
            [patient, currency],
            |r| r.get(0),
        )
        .expect("query failed")
    }
}

fn quest(id: &str, category: QuestCategory, event_type: &str, count: u32, xp: i64, points: i64) -> QuestDefinition {
    QuestDefinition {
        id: id.to_string(),
        title: id.replace('_', " "),
        description: String::new(),
        category,
        difficulty: QuestDifficulty::Easy,
        target: QuestTarget {
            event_type: event_type.to_string(),
            count,
        },
        xp_reward: xp,
        points_reward: points,
        active: true,
        starts_at: None,
        ends_at: None,
    }
}

fn reward(id: &str, cost: i64, stock: Option<i64>, kind: RewardKind, active: bool) -> Reward {
    Reward {
        id: id.to_string(),
        title: id.replace('_', " "),
        description: String::new(),
        point_cost: cost,
        stock,
        category: "test".to_string(),
        kind,
        active,
    }
}

/// Small, hand-countable rule set
///
/// - session_completed: 50 XP, 20 points; exercise_completed: 5 XP, 5 points
/// - levels at 0 / 100 / 300 / 600 XP, no streak milestones
/// - first_session achievement: +25 XP
/// - daily_session (1 session, 20 XP / 10 pts), daily_exercises (3 exercises),
///   weekly_sessions (3 sessions)
/// - mug: 100 pts, stock 1; freeze: 50 pts, unlimited; retired: inactive
pub fn config() -> EngineConfig {
    let mut events = HashMap::new();
    events.insert(
        "session_completed".to_string(),
        EventRule::flat(50, 20, LedgerReason::SessionCompleted),
    );
    events.insert(
        "exercise_completed".to_string(),
        EventRule::flat(5, 5, LedgerReason::Activity),
    );

    let mut config = EngineConfig {
        events,
        achievements: vec![Achievement {
            id: 0,
            code: "first_session".to_string(),
            title: "First Steps".to_string(),
            description: String::new(),
            xp_reward: 25,
            points_reward: 0,
            unlock_rule: UnlockRule::EventCountAtLeast {
                event_type: "session_completed".to_string(),
                count: 1,
            },
            active: true,
        }],
        quests: vec![
            quest("daily_session", QuestCategory::Daily, "session_completed", 1, 20, 10),
            quest("daily_exercises", QuestCategory::Daily, "exercise_completed", 3, 30, 15),
            quest("weekly_sessions", QuestCategory::Weekly, "session_completed", 3, 100, 50),
        ],
        rewards: vec![
            reward("mug", 100, Some(1), RewardKind::Item, true),
            reward("freeze", 50, None, RewardKind::StreakFreeze, true),
            reward("retired", 10, None, RewardKind::Item, false),
        ],
        streak: StreakConfig {
            milestones: Vec::new(),
            repeat_every_days: 0,
        },
        ..EngineConfig::default()
    };
    config.leveling.thresholds = vec![0, 100, 300, 600];
    config.leaderboard.cache_ttl_secs = 0;
    config
}

/// Engine on a temp-dir database with a manual clock at `MONDAY_NOON`
pub fn engine_with(config: EngineConfig) -> TestEngine {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = EngineDb::open(&dir.path().join("engine.db")).expect("Failed to open db");
    let clock = Arc::new(ManualClock::new(MONDAY_NOON));
    let engine = Engine::with_db(config, db, clock.clone()).expect("Failed to build engine");
    TestEngine {
        engine,
        clock,
        _dir: dir,
    }
}

pub fn engine() -> TestEngine {
    engine_with(config())
}
