//! CLI command implementations

pub mod admin;
pub mod events;
pub mod init;
pub mod profile;
pub mod run;
pub mod shop;
