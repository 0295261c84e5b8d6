//! Ollama API types
//!
//! Structs that mirror the Ollama HTTP API JSON request and response formats.

use crate::history::Role;
use serde::{Deserialize, Serialize};

/// One message of a chat request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Sender role
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message with the given role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    /// Model to run
    pub model: &'a str,
    /// Full conversation, oldest first
    pub messages: &'a [ChatMessage],
    /// Always false: the relay waits for the whole reply
    pub stream: bool,
    /// How long the server keeps the model loaded
    pub keep_alive: &'a str,
    /// Sampling and context options
    pub options: ChatOptions,
}

/// `options` object of a chat request
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatOptions {
    /// Context window size
    pub num_ctx: u32,
    /// Sampling temperature, server default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response of `POST /api/chat` with `stream: false`
#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    /// The assistant reply
    pub message: ChatResponseMessage,
}

/// `message` object of a chat response
///
/// Only `content` is required; `role` is informational.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponseMessage {
    /// Reply text
    pub content: String,
    /// Reported role, usually `assistant`
    #[serde(default)]
    pub role: Option<Role>,
}

/// Response of `GET /api/tags`
#[derive(Deserialize, Debug)]
pub struct TagsResponse {
    /// Installed models
    pub models: Vec<ModelTag>,
}

/// One entry of the tags listing
#[derive(Deserialize, Debug)]
pub struct ModelTag {
    /// Model name, e.g. `llama3:latest`
    pub name: String,
}

/// Body of `POST /api/create`
#[derive(Serialize, Debug)]
pub struct CreateModelRequest<'a> {
    /// Name of the new model
    pub name: &'a str,
    /// Modelfile contents
    pub modelfile: &'a str,
    /// Always false
    pub stream: bool,
}

/// Response of `POST /api/create` with `stream: false`
#[derive(Deserialize, Debug)]
pub struct CreateModelResponse {
    /// `"success"` when the model was created
    #[serde(default)]
    pub status: String,
}

/// Body of `DELETE /api/delete`
#[derive(Serialize, Debug)]
pub struct DeleteModelRequest<'a> {
    /// Model to remove
    pub name: &'a str,
}
