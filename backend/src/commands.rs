//! Command surface
//!
//! The platform commands (chat, history, model management) and the pager
//! button actions. Each command reports progress and results through a
//! [`Responder`] and also returns a typed outcome for the HTTP layer.
//! Failures are rendered as red error cards before being returned.

use crate::config::Config;
use crate::error::AppError;
use crate::formatter::Page;
use crate::history::{HistoryStore, UserId};
use crate::inference::OllamaClient;
use crate::pager::{Clock, Pager, PagerControls, PagerManager};
use crate::registry::{CreateModelSpec, ModelListFile, ModelRegistry};
use crate::session::{ExchangeRequest, SessionController};
use crate::surface::{self, BufferedResponder, InteractionRef, Reply, Responder, WebhookResponder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Default temperature for models created without one
pub const DEFAULT_CREATE_TEMPERATURE: f32 = 0.5;

/// Shared services every command runs against
pub struct AppContext {
    /// Settings the context was built from
    pub config: Config,
    /// Conversation history store
    pub history: Arc<HistoryStore>,
    /// Cached model list
    pub registry: Arc<ModelRegistry>,
    /// Runs exchanges against the inference server
    pub session: Arc<SessionController>,
    /// Live pagers
    pub pagers: Arc<PagerManager>,
    /// Shared HTTP client for the inference server and the platform API
    pub http: reqwest::Client,
    /// Cancelled on shutdown; every exchange runs under a child token
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Wire up all components from the configuration
    pub async fn new(config: Config, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let http = reqwest::Client::new();
        let history = Arc::new(HistoryStore::new(&config.storage.db_path).await?);
        let client = Arc::new(OllamaClient::new(http.clone(), &config.inference));
        let registry = Arc::new(ModelRegistry::new(
            client.clone(),
            ModelListFile::new(&config.storage.models_file),
            config.inference.default_model.clone(),
        ));
        let session = Arc::new(SessionController::new(
            history.clone(),
            client,
            config.presentation.max_response_length,
        ));
        let pagers = Arc::new(PagerManager::new(config.pager_idle_timeout(), clock));

        Ok(Self {
            config,
            history,
            registry,
            session,
            pagers,
            http,
            shutdown: CancellationToken::new(),
        })
    }

    /// Fill the model registry at startup
    ///
    /// Tries the server first, then the cached file, then falls back to the
    /// default model alone.
    pub async fn init_models(&self) -> Result<usize, AppError> {
        match self.registry.refresh().await {
            Ok(models) => return Ok(models.len()),
            Err(e) => warn!(error = %e, "Could not list models from inference server, using cache"),
        }
        self.registry.load_cached().await?;
        self.registry.seed_default().await?;
        Ok(self.registry.list().await.len())
    }

    /// Responder for a request: the platform webhook when an interaction is
    /// given, an in-memory transcript otherwise
    pub fn responder(&self, interaction: Option<InteractionRef>) -> Box<dyn Responder> {
        match interaction {
            Some(interaction) => Box::new(WebhookResponder::new(
                self.http.clone(),
                &self.config.presentation.platform_api_url,
                interaction,
            )),
            None => Box::new(BufferedResponder::new()),
        }
    }
}

/// Input of the `chat` command
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCommand {
    /// Platform user id
    pub user_id: UserId,
    /// Prompt text
    pub message: String,
    /// Defaults to the user's last used model
    #[serde(default)]
    pub model: Option<String>,
    /// Sent ahead of the history, never stored
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Sampling temperature override
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Input of the `clear_history` command
#[derive(Debug, Clone, Deserialize)]
pub struct ClearHistoryCommand {
    /// Platform user id
    pub user_id: UserId,
    /// Only clear this model's conversation
    #[serde(default)]
    pub model: Option<String>,
}

/// Input of the `create_model` command
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModelCommand {
    /// Name of the new model
    pub name: String,
    /// Written as the `SYSTEM` directive
    #[serde(default)]
    pub system_prompt: String,
    /// `FROM` model; empty leaves the directive out
    #[serde(default)]
    pub base_model: String,
    /// Complete modelfile, sent as-is when non-empty
    #[serde(default)]
    pub modelfile: Option<String>,
    /// Written as `PARAMETER temperature`
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Result of clearing history
#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    /// Turns deleted
    pub removed: u64,
    /// Model the clear was restricted to, if any
    pub model: Option<String>,
}

/// Pager button actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Show the current page again
    Current,
    /// Step back one page
    Previous,
    /// Step forward one page
    Next,
}

/// Snapshot of a pager for API responses
#[derive(Debug, Clone, Serialize)]
pub struct PagerView {
    /// Pager id used by the buttons
    pub pager_id: Uuid,
    /// Model that produced the pages
    pub model: String,
    /// Zero-based page index
    pub index: usize,
    /// Number of pages
    pub total: usize,
    /// Page being shown
    pub page: Page,
    /// Button states
    pub controls: PagerControls,
}

/// Build the reply and view for the pager's current page
fn render_pager(pager: &mut Pager) -> Result<(Reply, PagerView), AppError> {
    let page = pager.current()?.clone();
    let controls = pager.controls();
    let mut reply = Reply::page(&page, pager.id(), controls);
    reply
        .embeds
        .insert(0, surface::user_input(&pager.context().message));

    let view = PagerView {
        pager_id: pager.id(),
        model: pager.context().model.clone(),
        index: pager.index(),
        total: pager.len(),
        page,
        controls,
    };
    Ok((reply, view))
}

/// Deliver a reply; platform failures are logged, not propagated
async fn deliver(responder: &dyn Responder, reply: &Reply, edit: bool) {
    let result = if edit {
        responder.edit(reply).await
    } else {
        responder.send_reply(reply).await
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to deliver reply to platform");
    }
}

async fn defer(responder: &dyn Responder) {
    if let Err(e) = responder.defer().await {
        warn!(error = %e, "Failed to defer interaction");
    }
}

/// Render `err` as an error card, then hand it back
async fn report(responder: &dyn Responder, summary: &str, err: AppError) -> AppError {
    warn!(error = %err, "{}", summary);
    deliver(responder, &Reply::embed(surface::error_embed(summary, &err)), true).await;
    err
}

/// `chat`: run an exchange and open a pager on the reply
pub async fn chat(
    ctx: &AppContext,
    command: ChatCommand,
    responder: &dyn Responder,
) -> Result<PagerView, AppError> {
    const FAILED: &str = "An error occurred while processing the request.";
    defer(responder).await;

    let result = async move {
        if command.message.trim().is_empty() {
            return Err(AppError::Validation("Message cannot be empty.".to_string()));
        }
        let model = match command.model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => {
                ctx.registry
                    .current_for(&ctx.history, command.user_id)
                    .await?
            }
        };

        let mut progress = Reply::embed(surface::user_input(&command.message));
        progress.embeds.push(surface::processing());
        deliver(responder, &progress, true).await;

        let request = ExchangeRequest {
            model,
            user_id: command.user_id,
            message: command.message,
            system_prompt: command.system_prompt,
            temperature: command.temperature,
        };
        let cancel = ctx.shutdown.child_token();
        let rendered = ctx.session.run_exchange(&request, &cancel).await?;

        let pager = ctx.pagers.create(rendered.pages, request).await;
        let mut pager = pager.lock().await;
        render_pager(&mut pager)
    }
    .await;

    match result {
        Ok((reply, view)) => {
            deliver(responder, &reply, true).await;
            info!(pager_id = %view.pager_id, model = %view.model, pages = view.total, "Chat reply delivered");
            Ok(view)
        }
        Err(e) => Err(report(responder, FAILED, e).await),
    }
}

/// `clear_history`: drop a user's turns, optionally for one model
pub async fn clear_history(
    ctx: &AppContext,
    command: ClearHistoryCommand,
    responder: &dyn Responder,
) -> Result<ClearOutcome, AppError> {
    defer(responder).await;

    let model = command
        .model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    let removed = match ctx.history.clear(command.user_id, model.as_deref()).await {
        Ok(removed) => removed,
        Err(e) => {
            return Err(report(responder, "An error occurred while clearing your history.", e).await)
        }
    };

    let description = match &model {
        Some(model) => format!(
            "Your conversation history with the model '{}' has been cleared.",
            model
        ),
        None => "Your entire conversation history has been cleared.".to_string(),
    };
    deliver(
        responder,
        &Reply::embed(surface::success("History Cleared", &description)),
        true,
    )
    .await;

    info!(user_id = command.user_id, model = ?model, removed = removed, "History cleared");
    Ok(ClearOutcome { removed, model })
}

/// `create_model`: create a model on the server and register it
pub async fn create_model(
    ctx: &AppContext,
    command: CreateModelCommand,
    responder: &dyn Responder,
) -> Result<String, AppError> {
    defer(responder).await;

    let spec = CreateModelSpec {
        name: command.name,
        system_prompt: command.system_prompt,
        base_model: command.base_model,
        modelfile: command.modelfile,
        temperature: command.temperature.unwrap_or(DEFAULT_CREATE_TEMPERATURE),
    };
    match ctx.registry.create(spec).await {
        Ok(name) => {
            let description = format!(
                "Model '{}' created successfully and added to available models!",
                name
            );
            deliver(
                responder,
                &Reply::embed(surface::success("Model Created", &description)),
                true,
            )
            .await;
            Ok(name)
        }
        Err(e) => Err(report(responder, "An error occurred while creating the model.", e).await),
    }
}

/// `list_models`: cached model names, optionally filtered by `query`
pub async fn list_models(
    ctx: &AppContext,
    query: Option<&str>,
    responder: &dyn Responder,
) -> Result<Vec<String>, AppError> {
    let models = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => ctx.registry.matching(query).await,
        None => ctx.registry.list().await,
    };

    let description = if models.is_empty() {
        "No models available.".to_string()
    } else {
        models.join("\n")
    };
    deliver(
        responder,
        &Reply::embed(surface::listing("Available Models", &description)),
        false,
    )
    .await;

    Ok(models)
}

/// `delete_model`: delete a model on the server and unregister it
pub async fn delete_model(
    ctx: &AppContext,
    name: &str,
    responder: &dyn Responder,
) -> Result<String, AppError> {
    defer(responder).await;

    match ctx.registry.delete(name).await {
        Ok(name) => {
            let description = format!("Model '{}' deleted successfully.", name);
            deliver(
                responder,
                &Reply::embed(surface::success("Model Deleted", &description)),
                true,
            )
            .await;
            Ok(name)
        }
        Err(e) => Err(report(responder, "An error occurred while deleting the model.", e).await),
    }
}

/// `refresh_models`: reload the model list from the server
pub async fn refresh_models(
    ctx: &AppContext,
    responder: &dyn Responder,
) -> Result<Vec<String>, AppError> {
    defer(responder).await;

    match ctx.registry.refresh().await {
        Ok(models) => {
            deliver(
                responder,
                &Reply::embed(surface::success(
                    "Models Refreshed",
                    "Available models have been refreshed from the inference server.",
                )),
                true,
            )
            .await;
            Ok(models)
        }
        Err(e) => Err(report(
            responder,
            "An error occurred while refreshing the list of available models.",
            e,
        )
        .await),
    }
}

/// Pager buttons: show, previous, next
pub async fn navigate(
    ctx: &AppContext,
    pager_id: Uuid,
    direction: Direction,
    responder: &dyn Responder,
) -> Result<PagerView, AppError> {
    let result = async move {
        let pager = ctx.pagers.get(pager_id).await?;
        let mut pager = pager.lock().await;
        match direction {
            Direction::Current => pager.current().map(|_| ())?,
            Direction::Previous => pager.previous().map(|_| ())?,
            Direction::Next => pager.next().map(|_| ())?,
        }
        render_pager(&mut pager)
    }
    .await;

    match result {
        Ok((reply, view)) => {
            if direction != Direction::Current {
                deliver(responder, &reply, true).await;
            }
            Ok(view)
        }
        Err(e) => Err(report(responder, "An error occurred while updating the response.", e).await),
    }
}

/// Pager regenerate button: redo the last exchange and reset to page one
pub async fn regenerate(
    ctx: &AppContext,
    pager_id: Uuid,
    responder: &dyn Responder,
) -> Result<PagerView, AppError> {
    defer(responder).await;

    let result = async move {
        let pager = ctx.pagers.get(pager_id).await?;
        let mut pager = pager.lock().await;
        pager.current()?;

        deliver(responder, &Reply::embed(surface::regenerating()), true).await;

        let cancel = ctx.shutdown.child_token();
        pager.regenerate(&ctx.session, &cancel).await?;
        render_pager(&mut pager)
    }
    .await;

    match result {
        Ok((reply, view)) => {
            deliver(responder, &reply, true).await;
            Ok(view)
        }
        Err(e) => Err(report(responder, "An error occurred while regenerating the response.", e).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::ManualClock;
    use crate::surface::{EmbedColor, ResponderEvent};
    use mockito::Server;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_context(base_url: &str) -> (AppContext, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.inference.base_url = base_url.to_string();
        config.storage.db_path = temp_dir.path().join("history.db").to_string_lossy().to_string();
        config.storage.models_file = temp_dir.path().join("models.txt").to_string_lossy().to_string();
        let clock = Arc::new(ManualClock::new());
        let ctx = AppContext::new(config, clock.clone()).await.unwrap();
        (ctx, clock, temp_dir)
    }

    fn chat_command(message: &str) -> ChatCommand {
        ChatCommand {
            user_id: 5,
            message: message.to_string(),
            model: Some("llama3".to_string()),
            system_prompt: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_chat_opens_pager() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(
                json!({"message": {"role": "assistant", "content": "Hello!\n```rust\nfn main() {}\n```"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let (ctx, _clock, _temp_dir) = create_test_context(&server.url()).await;
        let responder = BufferedResponder::new();
        let view = chat(&ctx, chat_command("Hi"), &responder).await.unwrap();

        assert_eq!(view.total, 2);
        assert_eq!(view.index, 0);
        assert!(view.controls.next_enabled);
        assert!(ctx.pagers.get(view.pager_id).await.is_ok());

        let events = responder.events();
        assert_eq!(events[0], ResponderEvent::Deferred);
        let last = responder.last_reply().unwrap();
        assert_eq!(last.pager_id, Some(view.pager_id));
        assert_eq!(last.embeds[1].colour, EmbedColor::Green);
    }

    #[tokio::test]
    async fn test_chat_failure_renders_error_card() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model 'llama3' not found"}"#)
            .create_async()
            .await;

        let (ctx, _clock, _temp_dir) = create_test_context(&server.url()).await;
        let responder = BufferedResponder::new();
        let result = chat(&ctx, chat_command("Hi"), &responder).await;

        assert!(matches!(result, Err(AppError::Server { status: 404, .. })));
        let last = responder.last_reply().unwrap();
        assert_eq!(last.embeds[0].colour, EmbedColor::Red);
        assert!(last.embeds[0].fields[0].value.contains("not found"));
        assert!(ctx.history.fetch_conversation("llama3", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let (ctx, _clock, _temp_dir) = create_test_context("http://127.0.0.1:9").await;
        let responder = BufferedResponder::new();
        let result = chat(&ctx, chat_command("   "), &responder).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_navigate_and_expire() {
        let mut server = Server::new_async().await;
        let long_reply = "This is a sentence. ".repeat(200);
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(json!({"message": {"role": "assistant", "content": long_reply}}).to_string())
            .create_async()
            .await;

        let (ctx, clock, _temp_dir) = create_test_context(&server.url()).await;
        let responder = BufferedResponder::new();
        let view = chat(&ctx, chat_command("Tell me a lot"), &responder).await.unwrap();
        assert!(view.total > 1);

        let next = navigate(&ctx, view.pager_id, Direction::Next, &responder)
            .await
            .unwrap();
        assert_eq!(next.index, 1);
        let back = navigate(&ctx, view.pager_id, Direction::Previous, &responder)
            .await
            .unwrap();
        assert_eq!(back.index, 0);

        clock.advance(Duration::from_secs(ctx.config.presentation.pager_idle_timeout_secs));
        let result = navigate(&ctx, view.pager_id, Direction::Next, &responder).await;
        assert!(matches!(result, Err(AppError::Expired(_))));
    }

    #[tokio::test]
    async fn test_navigate_unknown_pager() {
        let (ctx, _clock, _temp_dir) = create_test_context("http://127.0.0.1:9").await;
        let responder = BufferedResponder::new();
        let result = navigate(&ctx, Uuid::new_v4(), Direction::Current, &responder).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_history_scoped() {
        let (ctx, _clock, _temp_dir) = create_test_context("http://127.0.0.1:9").await;
        ctx.history.append_exchange("llama3", 5, "q", "a", 1).await.unwrap();
        ctx.history.append_exchange("mistral", 5, "q", "a", 1).await.unwrap();

        let responder = BufferedResponder::new();
        let outcome = clear_history(
            &ctx,
            ClearHistoryCommand {
                user_id: 5,
                model: Some("llama3".to_string()),
            },
            &responder,
        )
        .await
        .unwrap();

        assert_eq!(outcome.removed, 2);
        assert_eq!(ctx.history.fetch_conversation("mistral", 5).await.unwrap().len(), 2);
        let last = responder.last_reply().unwrap();
        assert!(last.embeds[0]
            .description
            .as_deref()
            .unwrap()
            .contains("'llama3'"));
    }

    #[tokio::test]
    async fn test_list_models_with_query() {
        let (ctx, _clock, _temp_dir) = create_test_context("http://127.0.0.1:9").await;
        ctx.registry.seed_default().await.unwrap();

        let responder = BufferedResponder::new();
        let models = list_models(&ctx, Some("DOLPHIN"), &responder).await.unwrap();
        assert_eq!(models, vec!["dolphin-mistral".to_string()]);

        let none = list_models(&ctx, Some("gemma"), &responder).await.unwrap();
        assert!(none.is_empty());
        let last = responder.last_reply().unwrap();
        assert_eq!(last.embeds[0].description.as_deref(), Some("No models available."));
    }

    #[tokio::test]
    async fn test_init_models_falls_back_to_default() {
        let (ctx, _clock, _temp_dir) = create_test_context("http://127.0.0.1:9").await;
        assert_eq!(ctx.init_models().await.unwrap(), 1);
        assert_eq!(ctx.registry.list().await, vec!["dolphin-mistral".to_string()]);
    }
}
