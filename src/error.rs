//! Engine error taxonomy
//!
//! Precondition failures are terminal for the attempt and carry enough detail
//! for the caller to show an actionable reason. Storage failures are the only
//! retryable kind.

use crate::domain::{Currency, LedgerReason, QuestStatus};

/// Error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid ledger amount {amount} for {reason:?} ({currency:?})")]
    InvalidLedgerAmount {
        amount: i64,
        currency: Currency,
        reason: LedgerReason,
    },

    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("Reward out of stock: {0}")]
    RewardOutOfStock(String),

    #[error("Reward is not active: {0}")]
    RewardInactive(String),

    #[error("Duplicate redemption of {reward_id} by {patient_id}")]
    DuplicateRedemption {
        patient_id: String,
        reward_id: String,
    },

    #[error("Quest {id} is not completed (status: {status:?})")]
    QuestNotCompleted { id: String, status: QuestStatus },

    #[error("Quest already claimed: {0}")]
    QuestAlreadyClaimed(String),

    #[error("Achievement rule evaluation failed for {code}: {message}")]
    AchievementRuleEvaluationFailure { code: String, message: String },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Unknown reward: {0}")]
    UnknownReward(String),

    #[error("Unknown quest: {0}")]
    UnknownQuest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
