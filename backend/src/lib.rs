//! Llama Relay Library
//!
//! Chat relay between a chat platform and an Ollama inference server.
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod formatter;
/// Per-user, per-model conversation history
///
/// Stored in SQLite and ordered by an autoincrement sequence number.
pub mod history;
pub mod inference;
pub mod pager;
pub mod registry;
pub mod session;
pub mod surface;
