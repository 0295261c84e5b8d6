//! Inference server module
//!
//! Typed client for the Ollama HTTP API used for chat completions and
//! model management.

pub mod client;
pub mod types;

pub use client::OllamaClient;
pub use types::ChatMessage;
