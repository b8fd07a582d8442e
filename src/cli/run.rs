//! Rollover and the long-running service loop

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use physio_quest::engine::run_scheduler;
use physio_quest::notify::{LogSink, run_dispatcher};
use physio_quest::Engine;

pub fn rollover_command(engine: &Engine) -> Result<()> {
    let report = engine.run_rollover()?;
    println!(
        "Rollover: {} patients, {} expired, {} issued, {} failed",
        report.patients, report.expired, report.issued, report.failed
    );
    Ok(())
}

/// Run scheduled rollover, evaluation retries and notification delivery
/// until Ctrl-C
pub async fn run_command(engine: Engine) -> Result<()> {
    let rx = engine.outbox().subscribe();
    let dispatcher = tokio::spawn(run_dispatcher(rx, Arc::new(LogSink)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(engine.clone(), shutdown_rx));

    info!("Running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    scheduler.await?;
    engine.outbox().close();
    dispatcher.await?;
    Ok(())
}
