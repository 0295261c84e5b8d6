//! Chat API endpoints
//!
//! Handles the `chat` and `clear_history` commands.

use crate::api::utils::{responder_for, validate_message, RouterState};
use crate::commands::{self, ChatCommand, ClearHistoryCommand, ClearOutcome, PagerView};
use crate::error::AppError;
use crate::surface::InteractionRef;
use axum::{extract::State, response::Json};
use serde::Deserialize;

/// Request to chat with a model
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Command fields, inlined in the body
    #[serde(flatten)]
    pub command: ChatCommand,
    /// Platform interaction to mirror replies to
    #[serde(default)]
    pub interaction: Option<InteractionRef>,
}

/// Request to clear conversation history
#[derive(Debug, Deserialize)]
pub struct ClearHistoryRequest {
    /// Command fields, inlined in the body
    #[serde(flatten)]
    pub command: ClearHistoryCommand,
    /// Platform interaction to mirror replies to
    #[serde(default)]
    pub interaction: Option<InteractionRef>,
}

/// POST /api/chat - Run one exchange and open a pager on the reply
pub async fn chat(
    State(state): State<RouterState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<PagerView>, AppError> {
    validate_message(&request.command.message)?;

    let responder = responder_for(&state, request.interaction);
    let view = commands::chat(&state, request.command, responder.as_ref()).await?;
    Ok(Json(view))
}

/// POST /api/history/clear - Clear a user's conversation history
pub async fn clear_history(
    State(state): State<RouterState>,
    Json(request): Json<ClearHistoryRequest>,
) -> Result<Json<ClearOutcome>, AppError> {
    let responder = responder_for(&state, request.interaction);
    let outcome = commands::clear_history(&state, request.command, responder.as_ref()).await?;
    Ok(Json(outcome))
}
