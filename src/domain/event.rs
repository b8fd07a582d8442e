use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PatientId;

/// Inbound activity report from an activity-producing collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub patient_id: PatientId,
    /// e.g. "session_completed", "exercise_completed"
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form details (`exercises_count`, `on_time`, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ActivityEvent {
    pub fn new(
        patient_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            event_type: event_type.into(),
            timestamp,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
