//! Event and award commands

use anyhow::{Context, Result};
use chrono::Utc;

use physio_quest::{ActivityEvent, Engine};

/// Report an activity event for a patient
pub fn event_command(engine: &Engine, patient: &str, event_type: &str, metadata: Option<String>) -> Result<()> {
    let metadata = match metadata {
        Some(raw) => serde_json::from_str(&raw).context("Metadata must be a JSON object")?,
        None => serde_json::Value::Null,
    };
    let event = ActivityEvent::new(patient, event_type, Utc::now()).with_metadata(metadata);
    let outcome = engine.report_event(&event)?;

    if outcome.credited.is_empty() {
        println!("Recorded {} (no credit)", event_type);
    }
    for entry in &outcome.credited {
        println!("  +{} {} ({})", entry.amount, entry.currency.as_str(), entry.description);
    }
    if let Some(streak) = &outcome.streak {
        println!("  Streak: {} day(s) [{:?}]", streak.current, streak.transition);
        if let Some(milestone) = &streak.milestone {
            println!("  Milestone bonus: +{} XP", milestone.xp);
        }
    }
    for unlock in &outcome.unlocked {
        println!("  Achievement unlocked: {} (+{} XP)", unlock.title, unlock.xp_reward);
    }
    for quest in &outcome.completed_quests {
        println!("  Quest completed: {} [{}]", quest.title, quest.id);
    }
    println!(
        "{}: level {}, {} XP, {} points",
        outcome.profile.patient_id, outcome.profile.level, outcome.profile.total_xp, outcome.profile.total_points
    );

    Ok(())
}

/// Grant a manual award (credited as XP and points)
pub fn award_command(engine: &Engine, patient: &str, amount: i64, description: &str) -> Result<()> {
    let profile = engine.grant_manual_award(patient, amount, description)?;
    println!(
        "Awarded {} to {}: now {} XP, {} points",
        amount, profile.patient_id, profile.total_xp, profile.total_points
    );
    Ok(())
}
