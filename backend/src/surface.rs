//! Platform surface
//!
//! Reply model (embeds, colours, pager buttons) and the [`Responder`]
//! capability commands use to talk back to the chat platform.

use crate::error::AppError;
use crate::formatter::{truncate_field, Page, FIELD_MAX_LENGTH};
use crate::pager::PagerControls;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Maximum length of an embed description
pub const DESCRIPTION_MAX_LENGTH: usize = 4096;

/// Timeout for webhook calls
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Embed accent colours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    /// Input echo and progress messages
    Blurple,
    /// Responses and confirmations
    Green,
    /// Code pages and listings
    Blue,
    /// Errors
    Red,
}

impl EmbedColor {
    /// RGB value as used by the platform
    pub fn value(self) -> u32 {
        match self {
            EmbedColor::Blurple => 0x5865F2,
            EmbedColor::Green => 0x2ECC71,
            EmbedColor::Blue => 0x3498DB,
            EmbedColor::Red => 0xE74C3C,
        }
    }
}

impl Serialize for EmbedColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.value())
    }
}

/// Named field of an embed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    /// Field heading
    pub name: String,
    /// Field text
    pub value: String,
    /// Render next to neighbouring fields
    pub inline: bool,
}

/// One embed card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    /// Card heading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Card body, at most `DESCRIPTION_MAX_LENGTH` characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accent colour
    #[serde(rename = "color")]
    pub colour: EmbedColor,
    /// Extra named fields
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// Embed with a title and a description clipped to the platform limit
    pub fn new(title: impl Into<String>, description: &str, colour: EmbedColor) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(truncate_field(description, DESCRIPTION_MAX_LENGTH)),
            colour,
            fields: Vec::new(),
        }
    }

    /// Append a field; the value is clipped to the field limit
    pub fn with_field(mut self, name: impl Into<String>, value: &str) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: truncate_field(value, FIELD_MAX_LENGTH),
            inline: false,
        });
        self
    }
}

/// A message to show on the platform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Cards in display order
    pub embeds: Vec<Embed>,
    /// Pager the buttons act on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pager_id: Option<Uuid>,
    /// Button states for `pager_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<PagerControls>,
}

impl Reply {
    /// Reply made of a single embed, without buttons
    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            pager_id: None,
            controls: None,
        }
    }

    /// Reply showing one pager page with its buttons
    pub fn page(page: &Page, pager_id: Uuid, controls: PagerControls) -> Self {
        Self {
            embeds: vec![render_page(page)],
            pager_id: Some(pager_id),
            controls: Some(controls),
        }
    }

    /// Body for the platform webhook API
    pub fn webhook_payload(&self) -> Value {
        let mut payload = json!({ "embeds": self.embeds });
        if let (Some(id), Some(controls)) = (self.pager_id, self.controls) {
            payload["components"] = json!([{
                "type": 1,
                "components": [
                    button(id, "previous", "⬅️", 1, controls.previous_enabled),
                    button(id, "next", "➡️", 1, controls.next_enabled),
                    button(id, "regenerate", "♻️", 3, controls.regenerate_enabled),
                ]
            }]);
        }
        payload
    }
}

fn button(pager_id: Uuid, action: &str, label: &str, style: u8, enabled: bool) -> Value {
    json!({
        "type": 2,
        "style": style,
        "label": label,
        "custom_id": format!("pager:{}:{}", pager_id, action),
        "disabled": !enabled,
    })
}

/// Embed for one page
pub fn render_page(page: &Page) -> Embed {
    match page {
        Page::Text { title, body } => Embed::new(title.clone(), body, EmbedColor::Green),
        Page::Code { language, body } => {
            // Clip the body, not the fenced block, so the closing fence survives
            let fence_len = language.chars().count() + "```\n\n```".len();
            let body = truncate_field(body, DESCRIPTION_MAX_LENGTH.saturating_sub(fence_len));
            Embed::new(
                page.title(),
                &format!("```{}\n{}\n```", language, body),
                EmbedColor::Blue,
            )
        }
    }
}

/// Echo of the user's message
pub fn user_input(message: &str) -> Embed {
    Embed {
        title: None,
        description: Some(truncate_field(message, DESCRIPTION_MAX_LENGTH)),
        colour: EmbedColor::Blurple,
        fields: Vec::new(),
    }
}

/// Shown while inference runs
pub fn processing() -> Embed {
    Embed::new(
        "Processing...",
        "Your request is being processed. Please wait.",
        EmbedColor::Blurple,
    )
}

/// Shown while a response is regenerated
pub fn regenerating() -> Embed {
    Embed::new(
        "Regenerating Response",
        "Please wait while the response is being regenerated...",
        EmbedColor::Blue,
    )
}

/// Green confirmation card
pub fn success(title: &str, description: &str) -> Embed {
    Embed::new(title, description, EmbedColor::Green)
}

/// Blue card for lists
pub fn listing(title: &str, description: &str) -> Embed {
    Embed::new(title, description, EmbedColor::Blue)
}

/// Error card with the failure in a "Details" field
pub fn error_embed(summary: &str, err: &AppError) -> Embed {
    Embed::new("Error", summary, EmbedColor::Red).with_field("Details", &err.to_string())
}

/// Reference to a platform interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    /// Interaction id
    pub id: String,
    /// Application the interaction belongs to
    pub application_id: String,
    /// Short-lived token for the webhook endpoints
    pub token: String,
}

/// Way for a command to talk back to the user
#[async_trait]
pub trait Responder: Send + Sync {
    /// Acknowledge the interaction before a slow operation
    async fn defer(&self) -> Result<(), AppError>;

    /// Post a new message
    async fn send_reply(&self, reply: &Reply) -> Result<(), AppError>;

    /// Replace the original message
    async fn edit(&self, reply: &Reply) -> Result<(), AppError>;
}

/// Responder over the platform's interaction webhook API
#[derive(Debug, Clone)]
pub struct WebhookResponder {
    http: reqwest::Client,
    api_url: String,
    interaction: InteractionRef,
}

impl WebhookResponder {
    /// Responder for `interaction` against the platform API at `api_url`
    pub fn new(http: reqwest::Client, api_url: &str, interaction: InteractionRef) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            interaction,
        }
    }

    fn webhook_url(&self) -> String {
        format!(
            "{}/webhooks/{}/{}",
            self.api_url, self.interaction.application_id, self.interaction.token
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<(), AppError> {
        let response = request.timeout(WEBHOOK_TIMEOUT).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(WEBHOOK_TIMEOUT.as_secs())
            } else {
                AppError::Transport(format!("Failed to reach platform API: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            error!(
                action = action,
                status_code = status.as_u16(),
                error_body = %body,
                "Platform API returned error status"
            );
            return Err(AppError::Server {
                status: status.as_u16(),
                body,
            });
        }

        debug!(action = action, interaction_id = %self.interaction.id, "Platform API call succeeded");
        Ok(())
    }
}

#[async_trait]
impl Responder for WebhookResponder {
    async fn defer(&self) -> Result<(), AppError> {
        let url = format!(
            "{}/interactions/{}/{}/callback",
            self.api_url, self.interaction.id, self.interaction.token
        );
        self.send(self.http.post(url).json(&json!({ "type": 5 })), "defer")
            .await
    }

    async fn send_reply(&self, reply: &Reply) -> Result<(), AppError> {
        let request = self.http.post(self.webhook_url()).json(&reply.webhook_payload());
        self.send(request, "send").await
    }

    async fn edit(&self, reply: &Reply) -> Result<(), AppError> {
        let url = format!("{}/messages/@original", self.webhook_url());
        let request = self.http.patch(url).json(&reply.webhook_payload());
        self.send(request, "edit").await
    }
}

/// What a [`BufferedResponder`] saw
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "reply", rename_all = "lowercase")]
pub enum ResponderEvent {
    /// `defer` was called
    Deferred,
    /// `send_reply` was called
    Sent(Reply),
    /// `edit` was called
    Edited(Reply),
}

/// Responder that keeps the transcript in memory
#[derive(Debug, Default)]
pub struct BufferedResponder {
    events: Mutex<Vec<ResponderEvent>>,
}

impl BufferedResponder {
    /// Empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ResponderEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<ResponderEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Most recent reply that was sent or edited in
    pub fn last_reply(&self) -> Option<Reply> {
        self.events().into_iter().rev().find_map(|event| match event {
            ResponderEvent::Sent(reply) | ResponderEvent::Edited(reply) => Some(reply),
            ResponderEvent::Deferred => None,
        })
    }
}

#[async_trait]
impl Responder for BufferedResponder {
    async fn defer(&self) -> Result<(), AppError> {
        self.push(ResponderEvent::Deferred);
        Ok(())
    }

    async fn send_reply(&self, reply: &Reply) -> Result<(), AppError> {
        self.push(ResponderEvent::Sent(reply.clone()));
        Ok(())
    }

    async fn edit(&self, reply: &Reply) -> Result<(), AppError> {
        self.push(ResponderEvent::Edited(reply.clone()));
        Ok(())
    }
}
