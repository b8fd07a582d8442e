//! Built-in rules and catalog used when no config file provides them

use std::collections::HashMap;

use super::events::{EventRule, FlagBonus, ItemBonus, TimeBonus};
use crate::domain::{
    Achievement, LedgerReason, QuestCategory, QuestDefinition, QuestDifficulty, QuestTarget,
    Reward, RewardKind, UnlockRule,
};

pub(super) fn default_event_rules() -> HashMap<String, EventRule> {
    let mut rules = HashMap::new();

    rules.insert(
        "session_completed".to_string(),
        EventRule {
            per_item: Some(ItemBonus {
                metadata_key: "exercises_count".to_string(),
                xp: 10,
                points: 0,
                cap: 20,
            }),
            time_bonuses: vec![
                TimeBonus {
                    label: "early bird".to_string(),
                    from_hour: 0,
                    until_hour: 10,
                    xp: 30,
                    points: 0,
                },
                TimeBonus {
                    label: "night owl".to_string(),
                    from_hour: 18,
                    until_hour: 24,
                    xp: 30,
                    points: 0,
                },
            ],
            ..EventRule::flat(50, 50, LedgerReason::SessionCompleted)
        },
    );
    rules.insert(
        "exercise_completed".to_string(),
        EventRule::flat(5, 5, LedgerReason::Activity),
    );
    rules.insert(
        "goal_achieved".to_string(),
        EventRule::flat(100, 100, LedgerReason::Activity),
    );
    rules.insert(
        "appointment_attended".to_string(),
        EventRule {
            flag_bonuses: vec![FlagBonus {
                metadata_key: "on_time".to_string(),
                label: "on time".to_string(),
                xp: 20,
                points: 0,
            }],
            ..EventRule::flat(30, 30, LedgerReason::Activity)
        },
    );

    rules
}

fn achievement(code: &str, title: &str, description: &str, xp: i64, rule: UnlockRule) -> Achievement {
    Achievement {
        id: 0,
        code: code.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        xp_reward: xp,
        points_reward: 0,
        unlock_rule: rule,
        active: true,
    }
}

fn sessions(count: u64) -> UnlockRule {
    UnlockRule::EventCountAtLeast {
        event_type: "session_completed".to_string(),
        count,
    }
}

pub(super) fn default_achievements() -> Vec<Achievement> {
    vec![
        achievement("first_session", "First Steps", "Complete your first session", 10, sessions(1)),
        achievement("ten_sessions", "Getting Stronger", "Complete 10 sessions", 50, sessions(10)),
        achievement("twenty_sessions", "Committed", "Complete 20 sessions", 100, sessions(20)),
        achievement(
            "streak_3",
            "On a Roll",
            "Stay active 3 days in a row",
            25,
            UnlockRule::StreakAtLeast { days: 3 },
        ),
        achievement(
            "streak_7",
            "Full Week",
            "Stay active 7 days in a row",
            75,
            UnlockRule::StreakAtLeast { days: 7 },
        ),
        achievement(
            "streak_30",
            "Unstoppable",
            "Stay active 30 days in a row",
            300,
            UnlockRule::StreakAtLeast { days: 30 },
        ),
        achievement(
            "goal_getter",
            "Goal Getter",
            "Reach a treatment goal",
            50,
            UnlockRule::EventCountAtLeast {
                event_type: "goal_achieved".to_string(),
                count: 1,
            },
        ),
        achievement(
            "level_5",
            "Rising Star",
            "Reach level 5",
            100,
            UnlockRule::LevelAtLeast { level: 5 },
        ),
        achievement(
            "quest_starter",
            "Quest Starter",
            "Claim your first quest reward",
            20,
            UnlockRule::QuestsClaimedAtLeast { count: 1 },
        ),
        achievement(
            "first_reward",
            "Treat Yourself",
            "Redeem your first reward",
            20,
            UnlockRule::RedemptionsAtLeast { count: 1 },
        ),
        achievement(
            "dedicated",
            "Dedicated",
            "Complete 10 sessions with a 7-day streak along the way",
            150,
            UnlockRule::AllOf {
                rules: vec![sessions(10), UnlockRule::LongestStreakAtLeast { days: 7 }],
            },
        ),
    ]
}

fn quest(
    id: &str,
    title: &str,
    category: QuestCategory,
    difficulty: QuestDifficulty,
    event_type: &str,
    count: u32,
    xp: i64,
    points: i64,
) -> QuestDefinition {
    QuestDefinition {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        category,
        difficulty,
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

pub(super) fn default_quests() -> Vec<QuestDefinition> {
    vec![
        quest(
            "daily_session",
            "Complete today's session",
            QuestCategory::Daily,
            QuestDifficulty::Easy,
            "session_completed",
            1,
            20,
            10,
        ),
        quest(
            "daily_exercises",
            "Do 5 exercises",
            QuestCategory::Daily,
            QuestDifficulty::Medium,
            "exercise_completed",
            5,
            30,
            15,
        ),
        quest(
            "weekly_sessions",
            "Three sessions this week",
            QuestCategory::Weekly,
            QuestDifficulty::Medium,
            "session_completed",
            3,
            100,
            50,
        ),
        quest(
            "weekly_appointment",
            "Attend your appointment",
            QuestCategory::Weekly,
            QuestDifficulty::Easy,
            "appointment_attended",
            1,
            40,
            20,
        ),
    ]
}

pub(super) fn default_rewards() -> Vec<Reward> {
    vec![
        Reward {
            id: "streak_freeze".to_string(),
            title: "Streak Freeze".to_string(),
            description: "Protects your streak for one missed day".to_string(),
            point_cost: 200,
            stock: None,
            category: "power_up".to_string(),
            kind: RewardKind::StreakFreeze,
            active: true,
        },
        Reward {
            id: "water_bottle".to_string(),
            title: "Clinic Water Bottle".to_string(),
            description: String::new(),
            point_cost: 500,
            stock: Some(20),
            category: "merchandise".to_string(),
            kind: RewardKind::Item,
            active: true,
        },
        Reward {
            id: "resistance_band".to_string(),
            title: "Resistance Band Kit".to_string(),
            description: String::new(),
            point_cost: 800,
            stock: Some(10),
            category: "equipment".to_string(),
            kind: RewardKind::Item,
            active: true,
        },
        Reward {
            id: "session_discount".to_string(),
            title: "10% Off Next Session".to_string(),
            description: String::new(),
            point_cost: 1500,
            stock: Some(5),
            category: "voucher".to_string(),
            kind: RewardKind::Item,
            active: true,
        },
    ]
}
