//! Gamification system: ledger, levels, streaks, achievements, quests,
//! rewards and leaderboards
//!
//! Every function here that writes takes a `&Connection` that the caller has
//! opened a transaction on; the caller commits and only then publishes the
//! collected notifications. Serialization per patient / per reward is the
//! engine's job (`crate::engine`).

pub mod achievements;
pub mod admin;
pub mod calendar;
pub mod leaderboard;
pub mod ledger;
pub mod levels;
pub mod quests;
pub mod rewards;
pub mod stats;
pub mod streaks;

pub use levels::{LevelInfo, LevelTable};

use chrono::FixedOffset;

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// Validated rule set the engine evaluates against
#[derive(Debug, Clone)]
pub struct Rules {
    pub config: EngineConfig,
    pub levels: LevelTable,
    pub offset: FixedOffset,
}

impl Rules {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let levels = config.leveling.table()?;
        let offset = calendar::offset_from_minutes(config.utc_offset_minutes);
        Ok(Self {
            config,
            levels,
            offset,
        })
    }

    /// Local day key for a timestamp
    pub fn day_key(&self, timestamp_ms: i64) -> String {
        calendar::day_key(timestamp_ms, self.offset)
    }
}
