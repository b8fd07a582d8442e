//! Scheduled work: quest rollover and evaluation retries
//!
//! Both are safe to run any number of times. Rollover locks one patient at a
//! time, never the whole population.

use std::sync::PoisonError;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Engine;
use crate::error::EngineResult;
use crate::gamification::{achievements, admin, quests};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverReport {
    pub patients: usize,
    pub expired: usize,
    pub issued: usize,
    /// Patients whose rollover failed; they are picked up by the next run
    pub failed: usize,
}

impl Engine {
    /// Expire stale quest instances and issue the current period's quests
    pub fn run_rollover(&self) -> EngineResult<RolloverReport> {
        let now = self.now_ms();
        let rules = &self.inner.rules;
        let patients = self.read(admin::patient_ids)?;
        let mut report = RolloverReport {
            patients: patients.len(),
            ..Default::default()
        };

        for patient_id in &patients {
            let result = self.inner.patient_locks.with(patient_id, || {
                self.transact(|conn, _| {
                    let expired = quests::expire_stale(conn, patient_id, now)?;
                    let issued = quests::issue_current(conn, rules, patient_id, now)?;
                    Ok((expired, issued))
                })
            });
            match result {
                Ok((expired, issued)) => {
                    report.expired += expired;
                    report.issued += issued;
                }
                Err(e) => {
                    warn!(patient_id = %patient_id, error = %e, "Quest rollover failed for patient");
                    report.failed += 1;
                }
            }
        }

        info!(
            patients = report.patients,
            expired = report.expired,
            issued = report.issued,
            failed = report.failed,
            "Quest rollover finished"
        );
        Ok(report)
    }

    /// Re-run achievement evaluation for patients whose last one failed
    ///
    /// Returns how many achievements were unlocked. Rule failures are logged
    /// again but not re-queued; storage failures stay queued.
    pub fn retry_pending_evaluations(&self) -> usize {
        let pending = std::mem::take(
            &mut *self
                .inner
                .pending_evaluations
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if pending.is_empty() {
            return 0;
        }
        debug!(count = pending.len(), "Retrying achievement evaluations");

        let rules = &self.inner.rules;
        let mut unlocked = 0;
        for patient_id in pending {
            let result = self.inner.patient_locks.with(&patient_id, || {
                let now = self.now_ms();
                self.transact(|conn, notes| achievements::evaluate(conn, rules, &patient_id, now, notes))
            });
            match result {
                Ok(report) => unlocked += report.unlocked.len(),
                Err(e) => {
                    warn!(patient_id = %patient_id, error = %e, "Achievement retry failed");
                    self.queue_evaluation(&patient_id);
                }
            }
        }
        unlocked
    }
}

/// Drive rollover and retries on their configured intervals until `shutdown`
/// flips to true
pub async fn run_scheduler(engine: Engine, mut shutdown: watch::Receiver<bool>) {
    let scheduler = &engine.rules().config.scheduler;
    let mut rollover = tokio::time::interval(Duration::from_secs(scheduler.rollover_interval_secs.max(1)));
    let mut retry = tokio::time::interval(Duration::from_secs(scheduler.retry_interval_secs.max(1)));
    rollover.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Scheduler started");
    loop {
        tokio::select! {
            _ = rollover.tick() => {
                let engine = engine.clone();
                match tokio::task::spawn_blocking(move || engine.run_rollover()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Quest rollover failed"),
                    Err(e) => warn!(error = %e, "Quest rollover task panicked"),
                }
            }
            _ = retry.tick() => {
                let engine = engine.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || engine.retry_pending_evaluations()).await {
                    warn!(error = %e, "Achievement retry task panicked");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Scheduler stopped");
}
