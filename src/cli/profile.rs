//! Read-only patient and practice views

use anyhow::{Result, bail};

use physio_quest::{Engine, LeaderboardMetric, LeaderboardPeriod, QuestCategory};

pub fn profile_command(engine: &Engine, patient: &str) -> Result<()> {
    let view = engine.get_profile(patient)?;
    let p = &view.profile;

    println!("{}{}", p.patient_id, if p.display_name.is_empty() { String::new() } else { format!(" ({})", p.display_name) });
    match view.level.xp_needed_for_next {
        Some(needed) => println!(
            "  Level {}: {}/{} XP into level ({:.0}%)",
            view.level.level,
            view.level.xp_into_level,
            needed,
            view.level.progress_percentage()
        ),
        None => println!("  Level {} (max)", view.level.level),
    }
    println!("  Total XP: {}", p.total_xp);
    println!("  Points: {}", p.total_points);
    println!("  Streak: {} (best {})", p.current_streak, p.longest_streak);
    println!("  Freeze tokens: {}", view.freeze_tokens);

    let achievements = engine.get_achievements(patient)?;
    println!(
        "  Achievements: {}/{}",
        achievements.unlocked.len(),
        achievements.unlocked.len() + achievements.locked.len()
    );
    for unlock in &achievements.unlocked {
        println!("    * {}", unlock.title);
    }

    Ok(())
}

pub fn quests_command(engine: &Engine, patient: &str, category: Option<String>) -> Result<()> {
    let category = match category {
        Some(raw) => match QuestCategory::from_str(&raw) {
            Some(c) => Some(c),
            None => bail!("Unknown quest category: {} (daily, weekly, special)", raw),
        },
        None => None,
    };

    let quests = engine.get_quests(patient, category)?;
    if quests.is_empty() {
        println!("No quests.");
        return Ok(());
    }

    for quest in quests {
        println!(
            "  [{}] {} {} - {}/{} ({}) +{} XP +{} pts",
            quest.id,
            quest.category.as_str(),
            quest.title,
            quest.progress.current,
            quest.progress.target,
            quest.status.as_str(),
            quest.xp_reward,
            quest.points_reward
        );
    }
    Ok(())
}

pub fn leaderboard_command(engine: &Engine, period: &str, metric: &str, limit: usize) -> Result<()> {
    let Some(period) = LeaderboardPeriod::from_str(period) else {
        bail!("Unknown period: {} (all, week, month)", period);
    };
    let Some(metric) = LeaderboardMetric::from_str(metric) else {
        bail!("Unknown metric: {} (total_xp, level, current_streak, achievements_count)", metric);
    };

    let entries = engine.get_leaderboard(period, metric, Some(limit))?;
    println!("Leaderboard ({}, {}):\n", period.as_str(), metric.as_str());
    for e in entries {
        let name = if e.display_name.is_empty() { &e.patient_id } else { &e.display_name };
        println!(
            "  {:>3}. {:<24} lvl {:>2}  {:>6} XP  streak {:>3}  achievements {}",
            e.rank, name, e.level, e.total_xp, e.current_streak, e.achievements_count
        );
    }
    Ok(())
}
