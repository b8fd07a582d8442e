use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use physio_quest::{Engine, EngineConfig};

mod cli;

#[derive(Parser)]
#[command(name = "physio-quest")]
#[command(about = "Gamification engine for physiotherapy patient engagement")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.physio-quest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the built-in rules and catalog to a config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Report an activity event
    Event {
        patient: String,
        /// e.g. session_completed, exercise_completed, goal_achieved
        event_type: String,
        /// JSON metadata, e.g. '{"exercises_count": 6}'
        #[arg(long = "meta")]
        metadata: Option<String>,
    },

    /// Show a patient's level, streak, points and achievements
    Profile { patient: String },

    /// Grant XP and points manually
    Award {
        patient: String,
        amount: i64,
        #[arg(default_value = "Manual award")]
        description: String,
    },

    /// List a patient's current quests
    Quests {
        patient: String,
        /// daily, weekly or special
        #[arg(long)]
        category: Option<String>,
    },

    /// Claim a completed quest by its instance id
    Claim { quest_id: String },

    /// List the rewards shop
    Rewards,

    /// Redeem a reward for a patient
    Redeem { patient: String, reward: String },

    /// Show the leaderboard
    Leaderboard {
        /// all, week or month
        #[arg(long, default_value = "all")]
        period: String,
        /// total_xp, level, current_streak or achievements_count
        #[arg(long, default_value = "total_xp")]
        metric: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Expire stale quests and issue the current period's quests
    Rollover,

    /// Practice engagement statistics
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Patients who have gone inactive
    AtRisk {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show a patient's ledger entries, newest first
    History {
        patient: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Reset a patient's current streak
    ResetStreak { patient: String },

    /// Set a patient's leaderboard display name
    Rename { patient: String, name: String },

    /// Add stock to a reward
    Restock { reward: String, amount: i64 },

    /// Run the scheduler and notification dispatcher until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if let Commands::Init { force } = cli.command {
        return cli::init::init_command(cli.config, force);
    }

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Event {
            patient,
            event_type,
            metadata,
        } => cli::events::event_command(&engine, &patient, &event_type, metadata)?,
        Commands::Profile { patient } => cli::profile::profile_command(&engine, &patient)?,
        Commands::Award {
            patient,
            amount,
            description,
        } => cli::events::award_command(&engine, &patient, amount, &description)?,
        Commands::Quests { patient, category } => cli::profile::quests_command(&engine, &patient, category)?,
        Commands::Claim { quest_id } => cli::shop::claim_command(&engine, &quest_id)?,
        Commands::Rewards => cli::shop::rewards_command(&engine)?,
        Commands::Redeem { patient, reward } => cli::shop::redeem_command(&engine, &patient, &reward)?,
        Commands::Leaderboard {
            period,
            metric,
            limit,
        } => cli::profile::leaderboard_command(&engine, &period, &metric, limit)?,
        Commands::Rollover => cli::run::rollover_command(&engine)?,
        Commands::Stats { days } => cli::admin::stats_command(&engine, days)?,
        Commands::AtRisk { limit } => cli::admin::at_risk_command(&engine, limit)?,
        Commands::History { patient, limit } => cli::admin::history_command(&engine, &patient, limit)?,
        Commands::ResetStreak { patient } => cli::admin::reset_streak_command(&engine, &patient)?,
        Commands::Rename { patient, name } => cli::admin::rename_command(&engine, &patient, &name)?,
        Commands::Restock { reward, amount } => cli::admin::restock_command(&engine, &reward, amount)?,
        Commands::Run => cli::run::run_command(engine).await?,
    }

    Ok(())
}
