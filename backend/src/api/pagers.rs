//! Pager API endpoints
//!
//! Backs the previous/next/regenerate buttons of a paged reply.

use crate::api::utils::{responder_for, InteractionBody, RouterState};
use crate::commands::{self, Direction, PagerView};
use crate::error::AppError;
use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

/// GET /api/pagers/:id - Current page
pub async fn get_pager(
    State(state): State<RouterState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PagerView>, AppError> {
    let responder = responder_for(&state, None);
    let view = commands::navigate(&state, id, Direction::Current, responder.as_ref()).await?;
    Ok(Json(view))
}

async fn move_pager(
    state: RouterState,
    id: Uuid,
    direction: Direction,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<PagerView>, AppError> {
    let interaction = body.and_then(|Json(body)| body.interaction);
    let responder = responder_for(&state, interaction);
    let view = commands::navigate(&state, id, direction, responder.as_ref()).await?;
    Ok(Json(view))
}

/// POST /api/pagers/:id/previous
pub async fn previous_page(
    State(state): State<RouterState>,
    Path(id): Path<Uuid>,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<PagerView>, AppError> {
    move_pager(state, id, Direction::Previous, body).await
}

/// POST /api/pagers/:id/next
pub async fn next_page(
    State(state): State<RouterState>,
    Path(id): Path<Uuid>,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<PagerView>, AppError> {
    move_pager(state, id, Direction::Next, body).await
}

/// POST /api/pagers/:id/regenerate - Redo the exchange behind the pager
pub async fn regenerate(
    State(state): State<RouterState>,
    Path(id): Path<Uuid>,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<PagerView>, AppError> {
    let interaction = body.and_then(|Json(body)| body.interaction);
    let responder = responder_for(&state, interaction);
    let view = commands::regenerate(&state, id, responder.as_ref()).await?;
    Ok(Json(view))
}
