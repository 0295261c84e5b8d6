//! API utility functions
//!
//! Shared router state, request envelopes and input validation used by the
//! handlers.

use crate::commands::AppContext;
use crate::error::AppError;
use crate::surface::{InteractionRef, Responder};
use serde::Deserialize;
use std::sync::Arc;

/// Router state type
pub type RouterState = Arc<AppContext>;

/// Maximum message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Body of requests that only carry an optional interaction reference
#[derive(Debug, Default, Deserialize)]
pub struct InteractionBody {
    /// Platform interaction to mirror replies to
    #[serde(default)]
    pub interaction: Option<InteractionRef>,
}

/// Validate a chat message
///
/// # Arguments
/// * `message` - Message to validate
///
/// # Returns
/// * `Ok(())` - Message is valid
/// * `Err(AppError)` - Message is empty or too long
pub fn validate_message(message: &str) -> Result<(), AppError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Message cannot be empty.".to_string()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(AppError::Validation(format!(
            "Message exceeds maximum length of {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}

/// Responder for an optional interaction reference
pub fn responder_for(state: &RouterState, interaction: Option<InteractionRef>) -> Box<dyn Responder> {
    state.responder(interaction)
}
