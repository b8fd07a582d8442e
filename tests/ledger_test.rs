//! Ledger authority and balance invariants

mod common;

use common::engine;
use physio_quest::{Currency, EngineError, LedgerReason};

#[test]
fn test_profile_totals_match_ledger_sums() {
    let t = engine();

    let outcome = t.event("p1", "session_completed");
    assert_eq!(outcome.profile.total_xp, 75); // 50 + first_session bonus
    assert_eq!(outcome.profile.total_points, 20);

    let outcome = t.event("p1", "session_completed");
    assert_eq!(outcome.profile.total_xp, 125);
    assert_eq!(outcome.profile.level, 2);

    let profile = t.engine.grant_manual_award("p1", 30, "Great form").unwrap();
    assert_eq!(profile.total_xp, 155);
    assert_eq!(profile.total_points, 70);

    let view = t.engine.get_profile("p1").unwrap();
    assert_eq!(view.profile.total_xp, t.ledger_sum("p1", "xp"));
    assert_eq!(view.profile.total_points, t.ledger_sum("p1", "points"));
}

#[test]
fn test_level_info_is_derived_from_xp() {
    let t = engine();
    t.event("p1", "session_completed");
    t.event("p1", "session_completed");

    let view = t.engine.get_profile("p1").unwrap();
    assert_eq!(view.level.level, 2);
    assert_eq!(view.level.xp_into_level, 25);
    assert_eq!(view.level.xp_needed_for_next, Some(200));
    assert_eq!(view.level.next_level_threshold, Some(300));
}

#[test]
fn test_zero_and_wrong_signed_amounts_are_rejected() {
    let t = engine();

    let err = t
        .engine
        .append_ledger_entry("p1", Currency::Xp, 0, LedgerReason::ManualAward, "nothing")
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidLedgerAmount { amount: 0, .. }));

    let err = t
        .engine
        .append_ledger_entry("p1", Currency::Points, -10, LedgerReason::QuestClaim, "bad")
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidLedgerAmount { amount: -10, .. }));

    let err = t.engine.grant_manual_award("p1", -5, "bad").unwrap_err();
    assert!(matches!(err, EngineError::InvalidLedgerAmount { .. }));

    assert_eq!(t.scalar("SELECT COUNT(*) FROM ledger_entries WHERE patient_id = ?1", "p1"), 0);
}

#[test]
fn test_debit_beyond_balance_is_rejected() {
    let t = engine();
    t.event("p1", "session_completed");

    let err = t
        .engine
        .append_ledger_entry("p1", Currency::Points, -1000, LedgerReason::Redemption, "too much")
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientPoints {
            balance: 20,
            required: 1000
        }
    ));

    let view = t.engine.get_profile("p1").unwrap();
    assert_eq!(view.profile.total_points, 20);
    assert_eq!(t.ledger_sum("p1", "points"), 20);
}

#[test]
fn test_unknown_event_type_is_recorded_without_credit() {
    let t = engine();
    let outcome = t.event("p1", "pain_diary_entry");

    assert!(outcome.credited.is_empty());
    assert!(outcome.streak.is_none());
    assert_eq!(outcome.profile.total_xp, 0);
    assert_eq!(
        t.scalar("SELECT COUNT(*) FROM activity_events WHERE patient_id = ?1", "p1"),
        1
    );
}

#[test]
fn test_profile_query_for_unknown_patient() {
    let t = engine();
    assert!(matches!(
        t.engine.get_profile("nobody"),
        Err(EngineError::ProfileNotFound(_))
    ));
}

#[test]
fn test_history_is_newest_first() {
    let t = engine();
    t.event("p1", "session_completed");
    t.engine.grant_manual_award("p1", 10, "bonus").unwrap();

    let history = t.engine.ledger_history("p1", 10).unwrap();
    assert_eq!(history[0].reason, LedgerReason::ManualAward);
    assert_eq!(history.last().unwrap().reason, LedgerReason::SessionCompleted);
}
