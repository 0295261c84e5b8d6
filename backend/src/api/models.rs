//! Model management API endpoints

use crate::api::utils::{responder_for, InteractionBody, RouterState};
use crate::commands::{self, CreateModelCommand};
use crate::error::AppError;
use crate::surface::InteractionRef;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Query parameters of GET /api/models
#[derive(Debug, Default, Deserialize)]
pub struct ListModelsQuery {
    /// Case-insensitive substring filter (autocomplete)
    pub query: Option<String>,
}

/// Request to create a model
#[derive(Debug, Deserialize)]
pub struct CreateModelRequest {
    /// Command fields, inlined in the body
    #[serde(flatten)]
    pub command: CreateModelCommand,
    /// Platform interaction to mirror replies to
    #[serde(default)]
    pub interaction: Option<InteractionRef>,
}

/// List of model names
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Model names in registry order
    pub models: Vec<String>,
}

/// A single model name
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    /// Name of the created or deleted model
    pub name: String,
}

/// GET /api/models - List cached models
pub async fn list_models(
    State(state): State<RouterState>,
    Query(params): Query<ListModelsQuery>,
) -> Result<Json<ModelsResponse>, AppError> {
    let responder = responder_for(&state, None);
    let models = commands::list_models(&state, params.query.as_deref(), responder.as_ref()).await?;
    Ok(Json(ModelsResponse { models }))
}

/// POST /api/models - Create a model on the inference server
pub async fn create_model(
    State(state): State<RouterState>,
    Json(request): Json<CreateModelRequest>,
) -> Result<Json<ModelResponse>, AppError> {
    let responder = responder_for(&state, request.interaction);
    let name = commands::create_model(&state, request.command, responder.as_ref()).await?;
    Ok(Json(ModelResponse { name }))
}

/// DELETE /api/models/:name - Delete a model
pub async fn delete_model(
    State(state): State<RouterState>,
    Path(name): Path<String>,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<ModelResponse>, AppError> {
    let interaction = body.and_then(|Json(body)| body.interaction);
    let responder = responder_for(&state, interaction);
    let name = commands::delete_model(&state, &name, responder.as_ref()).await?;
    Ok(Json(ModelResponse { name }))
}

/// POST /api/models/refresh - Reload models from the inference server
pub async fn refresh_models(
    State(state): State<RouterState>,
    body: Option<Json<InteractionBody>>,
) -> Result<Json<ModelsResponse>, AppError> {
    let interaction = body.and_then(|Json(body)| body.interaction);
    let responder = responder_for(&state, interaction);
    let models = commands::refresh_models(&state, responder.as_ref()).await?;
    Ok(Json(ModelsResponse { models }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::utils::test_support::create_test_router_state;
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn test_refresh_then_list() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(json!({"models": [{"name": "llama3:latest"}, {"name": "mistral:7b"}]}).to_string())
            .create_async()
            .await;

        let (router_state, _clock, _temp_dir) = create_test_router_state(&server.url()).await;
        let refreshed = refresh_models(State(router_state.clone()), None)
            .await
            .unwrap()
            .0;
        assert_eq!(refreshed.models.len(), 2);

        let listed = list_models(
            State(router_state),
            Query(ListModelsQuery {
                query: Some("mis".to_string()),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(listed.models, vec!["mistral:7b".to_string()]);
    }

    #[tokio::test]
    async fn test_create_model_duplicate_name() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/api/create")
            .expect(0)
            .create_async()
            .await;

        let (router_state, _clock, _temp_dir) = create_test_router_state(&server.url()).await;
        router_state.registry.seed_default().await.unwrap();

        let request: CreateModelRequest = serde_json::from_value(json!({
            "name": "dolphin-mistral",
            "system_prompt": "You are helpful.",
            "base_model": "llama3"
        }))
        .unwrap();
        let result = create_model(State(router_state), Json(request)).await;

        create.assert_async().await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_model_not_found_on_server() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/delete")
            .with_status(404)
            .with_body(r#"{"error":"model not found"}"#)
            .create_async()
            .await;

        let (router_state, _clock, _temp_dir) = create_test_router_state(&server.url()).await;
        router_state.registry.seed_default().await.unwrap();

        let result = delete_model(
            State(router_state.clone()),
            Path("dolphin-mistral".to_string()),
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFoundOnServer(_))));
        assert!(router_state.registry.contains("dolphin-mistral").await);
    }
}
