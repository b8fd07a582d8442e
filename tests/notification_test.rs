//! Notifications are published after commit, in order

mod common;

use common::engine;
use physio_quest::Notification;

#[test]
fn test_event_notifications() {
    let t = engine();
    let mut rx = t.engine.outbox().subscribe();

    t.event("p1", "session_completed");
    let first: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(matches!(
        first.as_slice(),
        [
            Notification::AchievementUnlocked { .. },
            Notification::QuestCompleted { .. }
        ]
    ));

    t.event("p1", "session_completed");
    let second: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        second,
        vec![Notification::LevelUp {
            patient_id: "p1".to_string(),
            old_level: 1,
            new_level: 2,
        }]
    );
}

#[test]
fn test_redemption_notification() {
    let t = engine();
    for _ in 0..5 {
        t.event("p1", "session_completed");
    }
    let mut rx = t.engine.outbox().subscribe();

    t.engine.redeem_reward("p1", "mug").unwrap();
    let notes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(notes.iter().any(|n| matches!(
        n,
        Notification::RewardRedeemed { points_spent: 100, .. }
    )));
}
