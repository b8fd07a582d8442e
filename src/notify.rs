//! Post-commit notifications
//!
//! The engine collects notifications while a transaction runs and hands them
//! to the `Outbox` only after commit, so nothing is announced for work that
//! rolled back. Delivery is asynchronous and never affects engine state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Something a patient should hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    AchievementUnlocked {
        patient_id: String,
        code: String,
        title: String,
        xp_reward: i64,
    },
    LevelUp {
        patient_id: String,
        old_level: u32,
        new_level: u32,
    },
    StreakMilestone {
        patient_id: String,
        days: u32,
        xp: i64,
        points: i64,
    },
    QuestCompleted {
        patient_id: String,
        quest_id: String,
        title: String,
    },
    RewardRedeemed {
        patient_id: String,
        reward_id: String,
        title: String,
        points_spent: i64,
    },
}

impl Notification {
    pub fn patient_id(&self) -> &str {
        match self {
            Self::AchievementUnlocked { patient_id, .. }
            | Self::LevelUp { patient_id, .. }
            | Self::StreakMilestone { patient_id, .. }
            | Self::QuestCompleted { patient_id, .. }
            | Self::RewardRedeemed { patient_id, .. } => patient_id,
        }
    }

    /// Short human-readable message
    pub fn message(&self) -> String {
        match self {
            Self::AchievementUnlocked { title, xp_reward, .. } => {
                format!("Achievement unlocked: {title} (+{xp_reward} XP)")
            }
            Self::LevelUp { new_level, .. } => format!("Level up! You reached level {new_level}"),
            Self::StreakMilestone { days, xp, .. } => format!("{days}-day streak! +{xp} XP"),
            Self::QuestCompleted { title, .. } => format!("Quest completed: {title}"),
            Self::RewardRedeemed { title, points_spent, .. } => {
                format!("Redeemed {title} for {points_spent} points")
            }
        }
    }
}

/// Sending half held by the engine
///
/// Without a dispatcher attached, notifications are dropped.
#[derive(Clone, Default)]
pub struct Outbox {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Notification>>>>,
}

impl Outbox {
    /// Attach a new channel and return its receiving half
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Detach the channel; the dispatcher drains what is queued, then ends
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn publish(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return;
        };
        for notification in notifications {
            if tx.send(notification).is_err() {
                warn!("Notification receiver dropped");
                return;
            }
        }
    }
}

/// Delivery target (push service, websocket hub, ...)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Sink that writes notifications to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_string(notification)?;
        info!(
            patient_id = notification.patient_id(),
            %payload,
            "{}",
            notification.message()
        );
        Ok(())
    }
}

/// Delivery attempts per notification before it is dropped
const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Forward notifications to `sink` until the channel closes
///
/// Failed deliveries are retried with exponential backoff, then dropped with
/// a warning.
pub async fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Notification>, sink: Arc<dyn NotificationSink>) {
    while let Some(notification) = rx.recv().await {
        let mut attempt = 1;
        loop {
            match sink.deliver(&notification).await {
                Ok(()) => break,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let delay = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(attempt, error = %e, "Notification delivery failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        patient_id = notification.patient_id(),
                        error = %e,
                        "Dropping notification after {} attempts",
                        MAX_ATTEMPTS
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_left: AtomicU32,
        delivered: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(&self, notification: &Notification) -> Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("push service unavailable");
            }
            self.delivered.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn level_up() -> Notification {
        Notification::LevelUp {
            patient_id: "p1".to_string(),
            old_level: 1,
            new_level: 2,
        }
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(level_up()).unwrap();
        assert_eq!(json["type"], "level_up");
        assert_eq!(json["new_level"], 2);
    }

    #[test]
    fn test_publish_without_subscriber_is_noop() {
        Outbox::default().publish(vec![level_up()]);
    }

    #[tokio::test]
    async fn test_dispatcher_retries_failed_delivery() {
        let outbox = Outbox::default();
        let rx = outbox.subscribe();
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(2),
            delivered: Mutex::new(Vec::new()),
        });

        outbox.publish(vec![level_up()]);
        drop(outbox);
        run_dispatcher(rx, sink.clone()).await;

        assert_eq!(sink.delivered.lock().unwrap().as_slice(), &[level_up()]);
    }

    #[tokio::test]
    async fn test_close_drains_queued_notifications() {
        let outbox = Outbox::default();
        let engine_side = outbox.clone();
        let rx = outbox.subscribe();
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        });
        let streak = Notification::StreakMilestone {
            patient_id: "p1".to_string(),
            days: 7,
            xp: 100,
            points: 50,
        };

        engine_side.publish(vec![level_up(), streak.clone()]);
        outbox.close();
        engine_side.publish(vec![level_up()]);

        tokio::time::timeout(Duration::from_secs(5), run_dispatcher(rx, sink.clone()))
            .await
            .expect("dispatcher did not stop after close");
        assert_eq!(sink.delivered.lock().unwrap().as_slice(), &[level_up(), streak]);
    }
}
