//! SQLite persistence for the engine
//!
//! The datastore provides the two things the engine needs: atomic
//! read-modify-write of rows (SQLite transactions) and a durable
//! append-only ledger table.

mod catalog;
mod db;

pub use db::EngineDb;
