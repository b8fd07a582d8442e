//! Physio Quest - gamification engine for physiotherapy patient engagement
//!
//! Turns patient activity (completed sessions, exercises, goals, attended
//! appointments) into XP, levels, streaks, achievements, quests and a points
//! economy with a rewards shop.
//!
//! ## Guarantees
//!
//! - The ledger is the only authority for XP and points; profile totals are
//!   rewritten from ledger sums in the same transaction as every entry.
//! - Points and finite stock never go negative.
//! - An achievement unlocks, and pays its bonus, at most once per patient.
//! - Quest rollover can run any number of times per period.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gamification;
pub mod notify;
pub mod store;

pub use config::EngineConfig;
pub use domain::*;
pub use engine::{Clock, Engine, ManualClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use notify::Notification;
