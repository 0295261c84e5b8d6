//! API module
//!
//! Contains HTTP request handlers for the chat relay endpoints and the
//! router that binds them.

pub mod chat;
pub mod models;
pub mod pagers;
pub mod utils;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use utils::RouterState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Models currently in the registry cache
    pub models: usize,
    /// Pagers not yet swept
    pub live_pagers: usize,
}

/// GET /api/health
pub async fn health_check(State(state): State<RouterState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models: state.registry.list().await.len(),
        live_pagers: state.pagers.len().await,
    })
}

/// Routes of the relay, without middleware
pub fn router(state: RouterState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Conversation
        .route("/api/chat", post(chat::chat))
        .route("/api/history/clear", post(chat::clear_history))
        // Model management
        .route(
            "/api/models",
            get(models::list_models).post(models::create_model),
        )
        .route("/api/models/refresh", post(models::refresh_models))
        .route("/api/models/:name", delete(models::delete_model))
        // Pager buttons
        .route("/api/pagers/:id", get(pagers::get_pager))
        .route("/api/pagers/:id/previous", post(pagers::previous_page))
        .route("/api/pagers/:id/next", post(pagers::next_page))
        .route("/api/pagers/:id/regenerate", post(pagers::regenerate))
        .with_state(state)
}
