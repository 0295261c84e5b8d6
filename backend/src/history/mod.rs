//! History module
//!
//! Stores conversation turns per (user, model) in a SQLite database.

pub mod db;
pub mod models;

pub use db::HistoryStore;
pub use models::{Role, Turn, UserId};
