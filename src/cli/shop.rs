//! Rewards shop and quest claims

use anyhow::Result;

use physio_quest::Engine;

pub fn rewards_command(engine: &Engine) -> Result<()> {
    let rewards = engine.get_rewards_catalog()?;
    if rewards.is_empty() {
        println!("No rewards available.");
        return Ok(());
    }

    for reward in rewards {
        let stock = match reward.stock {
            Some(n) => format!("{} left", n),
            None => "unlimited".to_string(),
        };
        println!("  {:<20} {:>6} pts  {:<12} {}", reward.id, reward.point_cost, stock, reward.title);
    }
    Ok(())
}

pub fn redeem_command(engine: &Engine, patient: &str, reward_id: &str) -> Result<()> {
    let outcome = engine.redeem_reward(patient, reward_id)?;
    println!(
        "Redeemed {} for {} points ({} points left)",
        outcome.reward.title, outcome.redemption.points_spent, outcome.profile.total_points
    );
    Ok(())
}

pub fn claim_command(engine: &Engine, quest_id: &str) -> Result<()> {
    let outcome = engine.claim_quest(quest_id)?;
    println!(
        "Claimed {}: +{} XP, +{} points",
        outcome.quest.title, outcome.quest.xp_reward, outcome.quest.points_reward
    );
    for unlock in &outcome.unlocked {
        println!("  Achievement unlocked: {}", unlock.title);
    }
    Ok(())
}
