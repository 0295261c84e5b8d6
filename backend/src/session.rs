//! Conversation session controller
//!
//! Runs one chat exchange: load the conversation, call the inference
//! server, persist the new pair of turns and format the reply into pages.
//!
//! Each exchange moves through `Idle → AwaitingInference → Persisted →
//! Rendered`, or ends in `Failed`. Nothing is written unless inference
//! succeeded and the exchange was not cancelled.

use crate::error::AppError;
use crate::formatter::{self, PageSet};
use crate::history::{HistoryStore, Role, Turn, UserId};
use crate::inference::{ChatMessage, OllamaClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Input of one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Model to talk to
    pub model: String,
    /// Conversation owner
    pub user_id: UserId,
    /// New user message
    pub message: String,
    /// Optional system prompt, sent but never stored
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Optional sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Lifecycle of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Not started
    Idle,
    /// Inference call in flight
    AwaitingInference,
    /// Both turns written
    Persisted,
    /// Pages produced (terminal)
    Rendered,
    /// Ended with an error (terminal)
    Failed,
}

/// Result of a completed exchange
#[derive(Debug, Clone)]
pub struct RenderedExchange {
    /// Raw assistant reply as stored
    pub reply: String,
    /// Pages to show
    pub pages: PageSet,
    /// Final state, always `Rendered`
    pub state: ExchangeState,
}

/// Tracks and logs state transitions of a single exchange
struct ExchangeTracker<'a> {
    request: &'a ExchangeRequest,
    state: ExchangeState,
}

impl<'a> ExchangeTracker<'a> {
    fn new(request: &'a ExchangeRequest) -> Self {
        Self {
            request,
            state: ExchangeState::Idle,
        }
    }

    fn advance(&mut self, next: ExchangeState) {
        debug!(
            model = %self.request.model,
            user_id = self.request.user_id,
            from = ?self.state,
            to = ?next,
            "Exchange state change"
        );
        self.state = next;
    }

    fn fail(&mut self, error: AppError) -> AppError {
        warn!(
            model = %self.request.model,
            user_id = self.request.user_id,
            at = ?self.state,
            error = %error,
            "Exchange failed"
        );
        self.state = ExchangeState::Failed;
        error
    }
}

/// Orchestrates chat exchanges over the history store and inference client
pub struct SessionController {
    history: Arc<HistoryStore>,
    client: Arc<OllamaClient>,
    max_response_length: usize,
}

impl SessionController {
    /// Create a controller
    pub fn new(
        history: Arc<HistoryStore>,
        client: Arc<OllamaClient>,
        max_response_length: usize,
    ) -> Self {
        Self {
            history,
            client,
            max_response_length,
        }
    }

    /// Build the message list for the inference call
    ///
    /// Order: system prompt (if any), stored turns with alternating roles,
    /// then the new user message.
    pub fn build_messages(history: &[Turn], request: &ExchangeRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = request
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            messages.push(ChatMessage::new(Role::System, prompt));
        }
        messages.extend(
            history
                .iter()
                .enumerate()
                .map(|(i, turn)| ChatMessage::new(Role::for_position(i), turn.content.clone())),
        );
        messages.push(ChatMessage::new(Role::User, request.message.clone()));
        messages
    }

    /// Run one exchange
    ///
    /// # Returns
    /// * `Ok(RenderedExchange)` - reply persisted and paginated
    /// * `Err(AppError)` - nothing was persisted, except for
    ///   `HistoryInconsistent`
    pub async fn run_exchange(
        &self,
        request: &ExchangeRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedExchange, AppError> {
        let mut tracker = ExchangeTracker::new(request);

        if cancel.is_cancelled() {
            return Err(tracker.fail(AppError::Cancelled));
        }

        let turns = self
            .history
            .fetch_conversation(&request.model, request.user_id)
            .await
            .map_err(|e| tracker.fail(e))?;
        let messages = Self::build_messages(&turns, request);

        tracker.advance(ExchangeState::AwaitingInference);
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(tracker.fail(AppError::Cancelled)),
            result = self.client.chat(&request.model, &messages, request.temperature) => {
                result.map_err(|e| tracker.fail(e))?
            }
        };

        // Last point where the exchange can be abandoned without writes
        if cancel.is_cancelled() {
            return Err(tracker.fail(AppError::Cancelled));
        }

        self.history
            .append_exchange(
                &request.model,
                request.user_id,
                &request.message,
                &reply,
                chrono::Utc::now().timestamp(),
            )
            .await
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(ExchangeState::Persisted);

        let pages = formatter::build_page_set(&reply, self.max_response_length);
        tracker.advance(ExchangeState::Rendered);

        info!(
            model = %request.model,
            user_id = request.user_id,
            history_len = turns.len(),
            pages = pages.len(),
            "Exchange completed"
        );

        Ok(RenderedExchange {
            reply,
            pages,
            state: tracker.state,
        })
    }

    /// Drop the last exchange and run the request again
    ///
    /// Without a prior exchange this is a fresh exchange.
    pub async fn regenerate(
        &self,
        request: &ExchangeRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedExchange, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let removed = self
            .history
            .delete_last_exchange(&request.model, request.user_id)
            .await?;
        debug!(
            model = %request.model,
            user_id = request.user_id,
            removed = removed,
            "Regenerating exchange"
        );

        self.run_exchange(request, cancel).await
    }
}
