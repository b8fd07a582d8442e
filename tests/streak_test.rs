//! Streak transitions, freeze tokens and milestones

mod common;

use common::{config, engine, engine_with};
use physio_quest::config::{StreakConfig, StreakMilestone};
use physio_quest::Clock;
use physio_quest::gamification::streaks::StreakTransition;

#[test]
fn test_consecutive_days_then_gap_resets() {
    let t = engine();

    let day1 = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(day1.transition, StreakTransition::Started);
    assert_eq!(day1.current, 1);

    t.clock.advance_days(1);
    let day2 = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(day2.current, 2);

    // Nothing on day 3
    t.clock.advance_days(2);
    let day4 = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(day4.transition, StreakTransition::Reset);
    assert_eq!(day4.current, 1);
    assert_eq!(day4.longest, 2);
}

#[test]
fn test_same_day_does_not_extend() {
    let t = engine();
    t.event("p1", "session_completed");
    let again = t.event("p1", "exercise_completed").streak.unwrap();

    assert_eq!(again.transition, StreakTransition::Unchanged);
    assert_eq!(again.current, 1);
}

#[test]
fn test_freeze_token_bridges_missed_day() {
    let t = engine();
    for _ in 0..3 {
        t.event("p1", "session_completed");
    }
    t.engine.redeem_reward("p1", "freeze").unwrap();
    assert_eq!(t.engine.get_profile("p1").unwrap().freeze_tokens, 1);

    // Skip one day
    t.clock.advance_days(2);
    assert_eq!(t.engine.get_profile("p1").unwrap().profile.current_streak, 1);

    let update = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(update.transition, StreakTransition::Frozen { tokens_used: 1 });
    assert_eq!(update.current, 2);
    assert_eq!(t.engine.get_profile("p1").unwrap().freeze_tokens, 0);
}

#[test]
fn test_read_projects_broken_streak_without_writing() {
    let t = engine();
    t.event("p1", "session_completed");
    t.clock.advance_days(3);

    let view = t.engine.get_profile("p1").unwrap();
    assert_eq!(view.profile.current_streak, 0);
    assert_eq!(view.profile.longest_streak, 1);
    assert_eq!(
        t.scalar("SELECT current_streak FROM profiles WHERE patient_id = ?1", "p1"),
        1
    );
}

#[test]
fn test_milestone_bonus_is_credited_once() {
    let mut cfg = config();
    cfg.streak = StreakConfig {
        milestones: vec![StreakMilestone {
            days: 2,
            xp: 40,
            points: 10,
        }],
        repeat_every_days: 0,
    };
    let t = engine_with(cfg);

    t.event("p1", "session_completed");
    t.clock.advance_days(1);
    let update = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(update.milestone.map(|m| m.xp), Some(40));

    // Same day again: no second bonus
    t.event("p1", "session_completed");
    assert_eq!(
        t.scalar(
            "SELECT COUNT(*) FROM ledger_entries WHERE patient_id = ?1 AND reason = 'streak_bonus'",
            "p1"
        ),
        2
    );
}

#[test]
fn test_admin_reset_keeps_longest() {
    let t = engine();
    t.event("p1", "session_completed");
    t.clock.advance_days(1);
    t.event("p1", "session_completed");

    let profile = t.engine.reset_streak("p1").unwrap();
    assert_eq!(profile.current_streak, 0);
    assert_eq!(profile.longest_streak, 2);

    t.clock.advance_days(1);
    let update = t.event("p1", "session_completed").streak.unwrap();
    assert_eq!(update.current, 1);
}

#[test]
fn test_future_timestamp_does_not_stall_streak() {
    let t = engine();
    let skewed = t.clock.now_ms() + 30 * 86_400_000;
    let first = t.event_at("p1", "session_completed", skewed).streak.unwrap();
    assert_eq!(first.current, 1);

    let mut seen = Vec::new();
    for _ in 0..3 {
        t.clock.advance_days(1);
        let update = t.event("p1", "session_completed").streak.unwrap();
        seen.push((update.transition, update.current));
    }
    assert_eq!(
        seen,
        [
            (StreakTransition::Extended, 2),
            (StreakTransition::Extended, 3),
            (StreakTransition::Extended, 4),
        ]
    );
    let view = t.engine.get_profile("p1").unwrap();
    assert_eq!(view.profile.last_activity_day.as_deref(), Some("2026-10-22"));
}

#[test]
fn test_backdated_timestamp_counts_for_today() {
    let t = engine();
    t.event("p1", "session_completed");
    t.clock.advance_days(1);

    let stale = t.clock.now_ms() - 5 * 86_400_000;
    let update = t.event_at("p1", "session_completed", stale).streak.unwrap();
    assert_eq!(update.transition, StreakTransition::Extended);
    assert_eq!(update.current, 2);
}
