//! Rewards shop: preconditions, atomicity and the last-unit race

mod common;

use std::thread;
use std::time::Duration;

use common::{TestEngine, engine};
use physio_quest::EngineError;

/// Five sessions: 100 points
fn fund(t: &TestEngine, patient: &str) {
    for _ in 0..5 {
        t.event(patient, "session_completed");
    }
}

#[test]
fn test_redeem_debits_and_decrements_stock() {
    let t = engine();
    fund(&t, "p1");

    let outcome = t.engine.redeem_reward("p1", "mug").unwrap();
    assert_eq!(outcome.redemption.points_spent, 100);
    assert_eq!(outcome.reward.stock, Some(0));
    assert_eq!(outcome.profile.total_points, 0);
    assert_eq!(t.ledger_sum("p1", "points"), 0);

    let history = t.engine.redemption_history("p1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ledger_entry_id, outcome.redemption.ledger_entry_id);
}

#[test]
fn test_last_unit_race_has_one_winner() {
    let t = engine();
    fund(&t, "p1");
    fund(&t, "p2");

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = ["p1", "p2"]
            .into_iter()
            .map(|p| {
                let engine = &t.engine;
                s.spawn(move || engine.redeem_reward(p, "mug"))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::RewardOutOfStock(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(out_of_stock, 1);
    assert_eq!(t.scalar("SELECT stock FROM rewards WHERE id = ?1", "mug"), 0);
    assert_eq!(t.scalar("SELECT COUNT(*) FROM redemptions WHERE reward_id = ?1", "mug"), 1);

    // The loser kept its points
    let total = t.ledger_sum("p1", "points") + t.ledger_sum("p2", "points");
    assert_eq!(total, 100);
}

#[test]
fn test_insufficient_points_leaves_no_trace() {
    let t = engine();
    t.event("p1", "session_completed");
    let entries_before = t.scalar("SELECT COUNT(*) FROM ledger_entries WHERE patient_id = ?1", "p1");

    let err = t.engine.redeem_reward("p1", "mug").unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientPoints {
            balance: 20,
            required: 100
        }
    ));
    assert_eq!(
        t.scalar("SELECT COUNT(*) FROM ledger_entries WHERE patient_id = ?1", "p1"),
        entries_before
    );
    assert_eq!(t.scalar("SELECT stock FROM rewards WHERE id = ?1", "mug"), 1);
}

#[test]
fn test_inactive_and_unknown_rewards() {
    let t = engine();
    fund(&t, "p1");

    assert!(matches!(
        t.engine.redeem_reward("p1", "retired"),
        Err(EngineError::RewardInactive(_))
    ));
    assert!(matches!(
        t.engine.redeem_reward("p1", "yacht"),
        Err(EngineError::UnknownReward(_))
    ));

    let catalog = t.engine.get_rewards_catalog().unwrap();
    assert!(catalog.iter().all(|r| r.id != "retired"));
}

#[test]
fn test_double_submit_is_rejected_inside_window() {
    let t = engine();
    fund(&t, "p1");

    t.engine.redeem_reward("p1", "freeze").unwrap();
    let err = t.engine.redeem_reward("p1", "freeze").unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRedemption { .. }));

    t.clock.advance(Duration::from_secs(10));
    t.engine.redeem_reward("p1", "freeze").unwrap();
    assert_eq!(t.engine.get_profile("p1").unwrap().freeze_tokens, 2);
    assert_eq!(t.ledger_sum("p1", "points"), 0);
}

#[test]
fn test_restock_after_sell_out() {
    let t = engine();
    fund(&t, "p1");
    t.engine.redeem_reward("p1", "mug").unwrap();

    let reward = t.engine.restock_reward("mug", 2).unwrap();
    assert_eq!(reward.stock, Some(2));

    assert!(t.engine.restock_reward("mug", 0).is_err());
    assert_eq!(t.engine.restock_reward("freeze", 5).unwrap().stock, None);
}

#[test]
fn test_failed_redemption_publishes_nothing() {
    let t = engine();
    t.event("p1", "session_completed");
    let mut rx = t.engine.outbox().subscribe();

    assert!(t.engine.redeem_reward("p1", "mug").is_err());
    assert!(rx.try_recv().is_err());
}
