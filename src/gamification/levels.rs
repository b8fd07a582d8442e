//! XP and Level system
//!
//! Level is a pure function of total XP over a monotonic threshold table.
//! Nothing stores level as independent state; profiles cache it for display.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Cumulative XP at which each level starts
///
/// `thresholds[0]` is always 0 (level 1) and the table strictly increases,
/// so `level_for` is a binary search and is non-decreasing in XP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<i64>,
}

/// Result of a level lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: u32,
    /// XP earned since the current level started
    pub xp_into_level: i64,
    /// Size of the current level span (None at max level)
    pub xp_needed_for_next: Option<i64>,
    /// Cumulative XP at which the next level starts (None at max level)
    pub next_level_threshold: Option<i64>,
}

impl LevelInfo {
    /// Progress towards the next level, clamped to [0, 100]
    pub fn progress_percentage(&self) -> f64 {
        match self.xp_needed_for_next {
            Some(needed) if needed > 0 => {
                (self.xp_into_level as f64 / needed as f64 * 100.0).clamp(0.0, 100.0)
            }
            _ => 100.0, // Max level
        }
    }

    pub fn is_max_level(&self) -> bool {
        self.next_level_threshold.is_none()
    }
}

impl LevelTable {
    pub fn new(thresholds: Vec<i64>) -> EngineResult<Self> {
        match thresholds.first() {
            None => {
                return Err(EngineError::InvalidConfig(
                    "level thresholds must not be empty".to_string(),
                ));
            }
            Some(&first) if first != 0 => {
                return Err(EngineError::InvalidConfig(format!(
                    "first level threshold must be 0, got {first}"
                )));
            }
            _ => {}
        }
        if let Some(w) = thresholds.windows(2).find(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidConfig(format!(
                "level thresholds must strictly increase ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self { thresholds })
    }

    /// Build a table where each level span grows by `multiplier`
    ///
    /// Level 2 starts at `base_xp`; every following span is the previous one
    /// times `multiplier`, rounded down.
    pub fn geometric(base_xp: i64, multiplier: f64, max_level: u32) -> EngineResult<Self> {
        if base_xp <= 0 || multiplier < 1.0 || max_level == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "invalid geometric leveling: base_xp={base_xp}, multiplier={multiplier}, max_level={max_level}"
            )));
        }
        let mut thresholds = Vec::with_capacity(max_level as usize);
        thresholds.push(0);
        let mut span = base_xp;
        let mut accumulated = 0i64;
        for _ in 1..max_level {
            accumulated = accumulated.saturating_add(span);
            thresholds.push(accumulated);
            // epsilon keeps 1000 * 1.2 from flooring to 1199
            span = ((span as f64) * multiplier + 1e-9).floor() as i64;
        }
        Self::new(thresholds)
    }

    /// Level lookup for a total XP value (negative totals count as 0)
    pub fn level_for(&self, total_xp: i64) -> LevelInfo {
        let xp = total_xp.max(0);
        // thresholds[0] == 0 <= xp, so idx >= 1
        let idx = self.thresholds.partition_point(|&t| t <= xp);
        let start = self.thresholds[idx - 1];
        let next = self.thresholds.get(idx).copied();

        LevelInfo {
            level: idx as u32,
            xp_into_level: xp - start,
            xp_needed_for_next: next.map(|n| n - start),
            next_level_threshold: next,
        }
    }

    pub fn max_level(&self) -> u32 {
        self.thresholds.len() as u32
    }

    /// Cumulative XP at which `level` starts
    pub fn threshold_for(&self, level: u32) -> Option<i64> {
        level
            .checked_sub(1)
            .and_then(|i| self.thresholds.get(i as usize))
            .copied()
    }

    pub fn thresholds(&self) -> &[i64] {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LevelTable {
        LevelTable::new(vec![0, 100, 300, 600]).unwrap()
    }

    #[test]
    fn test_level_for_sample_table() {
        let table = sample();
        assert_eq!(table.level_for(0).level, 1);
        assert_eq!(table.level_for(99).level, 1);
        assert_eq!(table.level_for(100).level, 2);

        let info = table.level_for(250);
        assert_eq!(info.level, 2);
        assert_eq!(info.xp_into_level, 150);
        assert_eq!(info.xp_needed_for_next, Some(200));
        assert_eq!(info.next_level_threshold, Some(300));
        assert!((info.progress_percentage() - 75.0).abs() < 0.001);

        let top = table.level_for(650);
        assert_eq!(top.level, 4);
        assert!(top.is_max_level());
        assert_eq!(top.progress_percentage(), 100.0);
    }

    #[test]
    fn test_level_for_is_non_decreasing() {
        let table = LevelTable::geometric(1000, 1.2, 30).unwrap();
        let mut last = 0;
        for xp in (0..200_000).step_by(137) {
            let level = table.level_for(xp).level;
            assert!(level >= last, "level dropped at {xp}");
            last = level;
        }
    }

    #[test]
    fn test_geometric_matches_practice_progression() {
        let table = LevelTable::geometric(1000, 1.2, 5).unwrap();
        // spans: 1000, 1200, 1440, 1728
        assert_eq!(table.thresholds(), &[0, 1000, 2200, 3640, 5368]);
        assert_eq!(table.level_for(2199).level, 2);
        assert_eq!(table.threshold_for(3), Some(2200));
        assert_eq!(table.threshold_for(0), None);
    }

    #[test]
    fn test_rejects_non_monotonic_tables() {
        assert!(LevelTable::new(vec![]).is_err());
        assert!(LevelTable::new(vec![10, 20]).is_err());
        assert!(LevelTable::new(vec![0, 100, 100]).is_err());
        assert!(LevelTable::geometric(0, 1.2, 10).is_err());
    }

    #[test]
    fn test_negative_xp_counts_as_zero() {
        let info = sample().level_for(-5);
        assert_eq!(info.level, 1);
        assert_eq!(info.xp_into_level, 0);
    }
}
