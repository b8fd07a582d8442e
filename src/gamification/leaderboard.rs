//! Leaderboard ranking
//!
//! Entries are computed from profiles and windowed ledger / unlock data and
//! never persisted. Ties on the metric keep the earlier-created profile ahead
//! (then patient id), so the order is deterministic.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rusqlite::{Connection, params};

use super::{Rules, streaks};
use crate::domain::{LeaderboardEntry, LeaderboardMetric, LeaderboardPeriod};
use crate::error::EngineResult;

const DAY_MS: i64 = 86_400_000;

struct Candidate {
    entry: LeaderboardEntry,
    created_at: i64,
}

impl Candidate {
    fn score(&self, metric: LeaderboardMetric) -> i64 {
        match metric {
            LeaderboardMetric::TotalXp => self.entry.total_xp,
            LeaderboardMetric::Level => i64::from(self.entry.level),
            LeaderboardMetric::CurrentStreak => i64::from(self.entry.current_streak),
            LeaderboardMetric::AchievementsCount => self.entry.achievements_count as i64,
        }
    }
}

/// Compute the full ranking for a period and metric
pub fn rank(
    conn: &Connection,
    rules: &Rules,
    period: LeaderboardPeriod,
    metric: LeaderboardMetric,
    now_ms: i64,
) -> EngineResult<Vec<LeaderboardEntry>> {
    let since = period
        .days()
        .map(|d| now_ms - d * DAY_MS)
        .unwrap_or(i64::MIN);
    let today = rules.day_key(now_ms);

    let mut stmt = conn.prepare(
        r#"SELECT p.patient_id, p.display_name, p.current_streak, p.last_activity_day, p.created_at,
                  (SELECT COALESCE(SUM(l.amount), 0) FROM ledger_entries l
                    WHERE l.patient_id = p.patient_id AND l.currency = 'xp' AND l.created_at >= ?1),
                  (SELECT COUNT(*) FROM unlocked_achievements u
                    WHERE u.patient_id = p.patient_id AND u.unlocked_at >= ?1),
                  (SELECT COUNT(*) FROM freeze_tokens f
                    WHERE f.patient_id = p.patient_id AND f.consumed_at IS NULL)
           FROM profiles p"#,
    )?;
    let mut candidates = stmt
        .query_map(params![since], |r| {
            let stored_streak: u32 = r.get(2)?;
            let last_day: Option<String> = r.get(3)?;
            let window_xp: i64 = r.get(5)?;
            let tokens: u32 = r.get(7)?;
            Ok(Candidate {
                entry: LeaderboardEntry {
                    patient_id: r.get(0)?,
                    display_name: r.get(1)?,
                    // level reached on the window's XP alone
                    level: rules.levels.level_for(window_xp).level,
                    total_xp: window_xp,
                    current_streak: streaks::project_current(
                        stored_streak,
                        last_day.as_deref(),
                        &today,
                        tokens,
                    ),
                    achievements_count: r.get(6)?,
                    rank: 0,
                },
                created_at: r.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    candidates.sort_by(|a, b| {
        (Reverse(a.score(metric)), a.created_at, &a.entry.patient_id).cmp(&(
            Reverse(b.score(metric)),
            b.created_at,
            &b.entry.patient_id,
        ))
    });

    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| LeaderboardEntry {
            rank: i as u32 + 1,
            ..c.entry
        })
        .collect())
}

/// Time-bounded cache of computed rankings
pub struct LeaderboardCache {
    ttl: Duration,
    entries: Mutex<HashMap<(LeaderboardPeriod, LeaderboardMetric), (Instant, Arc<Vec<LeaderboardEntry>>)>>,
}

impl LeaderboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached ranking if younger than the TTL, otherwise recompute and store
    pub fn get_or_compute<F>(
        &self,
        period: LeaderboardPeriod,
        metric: LeaderboardMetric,
        compute: F,
    ) -> EngineResult<Arc<Vec<LeaderboardEntry>>>
    where
        F: FnOnce() -> EngineResult<Vec<LeaderboardEntry>>,
    {
        let key = (period, metric);
        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((at, ranking)) = entries.get(&key) {
                if at.elapsed() < self.ttl {
                    return Ok(Arc::clone(ranking));
                }
            }
        }

        let ranking = Arc::new(compute()?);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (Instant::now(), Arc::clone(&ranking)));
        Ok(ranking)
    }

    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
