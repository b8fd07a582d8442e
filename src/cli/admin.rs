//! Administrator commands

use anyhow::Result;

use physio_quest::Engine;

pub fn stats_command(engine: &Engine, days: i64) -> Result<()> {
    let stats = engine.engagement_stats(days)?;
    println!("Engagement (last {} days):\n", stats.window_days);
    println!(
        "  Patients: {} ({} active, {} in the last 7 days, {:.0}% engaged)",
        stats.total_patients, stats.active_patients, stats.active_last_7_days, stats.engagement_rate
    );
    println!("  At risk: {}", stats.at_risk_count);
    println!("  Average level: {:.1}", stats.average_level);
    println!("  Average streak: {:.1}", stats.average_streak);
    println!("  XP awarded: {}", stats.xp_awarded);
    println!("  Points awarded / redeemed: {} / {}", stats.points_awarded, stats.points_redeemed);
    println!("  Achievements unlocked: {}", stats.achievements_unlocked);
    println!("  Quests claimed: {}", stats.quests_claimed);
    println!("  Redemptions: {}", stats.redemptions);
    Ok(())
}

pub fn at_risk_command(engine: &Engine, limit: usize) -> Result<()> {
    let patients = engine.at_risk_patients(limit)?;
    if patients.is_empty() {
        println!("No patients at risk.");
        return Ok(());
    }
    for p in patients {
        println!(
            "  {:<24} inactive {} days (best streak {}, level {})",
            p.patient_id, p.days_inactive, p.longest_streak, p.level
        );
    }
    Ok(())
}

pub fn history_command(engine: &Engine, patient: &str, limit: usize) -> Result<()> {
    for entry in engine.ledger_history(patient, limit)? {
        println!(
            "  {} {:>+6} {:<6} {:<18} {}",
            entry.created_at,
            entry.amount,
            entry.currency.as_str(),
            entry.reason.as_str(),
            entry.description
        );
    }
    Ok(())
}

pub fn reset_streak_command(engine: &Engine, patient: &str) -> Result<()> {
    let profile = engine.reset_streak(patient)?;
    println!("Streak reset for {} (best {})", profile.patient_id, profile.longest_streak);
    Ok(())
}

pub fn rename_command(engine: &Engine, patient: &str, name: &str) -> Result<()> {
    engine.set_display_name(patient, name)?;
    println!("{} is now shown as {}", patient, name);
    Ok(())
}

pub fn restock_command(engine: &Engine, reward_id: &str, amount: i64) -> Result<()> {
    let reward = engine.restock_reward(reward_id, amount)?;
    match reward.stock {
        Some(stock) => println!("{}: {} in stock", reward.id, stock),
        None => println!("{} has unlimited stock", reward.id),
    }
    Ok(())
}
