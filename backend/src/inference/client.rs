//! Ollama API client
//!
//! Direct HTTP client for the inference server. Shares one
//! `reqwest::Client` for connection pooling.

use crate::config::InferenceConfig;
use crate::error::AppError;
use crate::inference::types::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, CreateModelRequest, CreateModelResponse,
    DeleteModelRequest, TagsResponse,
};
use anyhow::anyhow;
use reqwest::StatusCode;
use std::time::Duration;

/// Client for the Ollama HTTP API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    keep_alive: String,
    num_ctx: u32,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client from the inference configuration
    pub fn new(http: reqwest::Client, config: &InferenceConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            keep_alive: config.keep_alive.clone(),
            num_ctx: config.num_ctx,
            timeout: config.timeout(),
        }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else {
            AppError::Transport(format!("Failed to reach inference server: {}", e))
        }
    }

    /// Turn a non-success response into `AppError::Server` with its body
    async fn server_error(response: reqwest::Response) -> AppError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        tracing::error!(status_code = status, error_body = %body, "Inference server returned error status");
        AppError::Server { status, body }
    }

    /// Run one non-streaming chat completion
    ///
    /// # Arguments
    /// * `model` - Model name
    /// * `messages` - Full conversation including the new user message
    /// * `temperature` - Optional sampling temperature
    ///
    /// # Returns
    /// * `Ok(String)` - The assistant reply
    /// * `Err(AppError)` - `Timeout`, `Transport`, `Server` or `Internal`
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<String, AppError> {
        let request_body = ChatRequest {
            model,
            messages,
            stream: false,
            keep_alive: &self.keep_alive,
            options: ChatOptions {
                num_ctx: self.num_ctx,
                temperature,
            },
        };

        tracing::debug!(
            model = %model,
            message_count = messages.len(),
            "Calling inference server"
        );

        let response = self
            .http
            .post(self.url("/api/chat"))
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response).await);
        }

        let response_body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&response_body).map_err(|e| {
            AppError::Internal(anyhow!(
                "Failed to parse chat response: {} - Response body: {}",
                e,
                response_body
            ))
        })?;

        tracing::debug!(
            model = %model,
            response_len = parsed.message.content.len(),
            "Received chat response"
        );

        Ok(parsed.message.content)
    }

    /// List the models installed on the server
    pub async fn list_models(&self) -> Result<Vec<String>, AppError> {
        let response = self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() != StatusCode::OK {
            return Err(Self::server_error(response).await);
        }

        let response_body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: TagsResponse = serde_json::from_str(&response_body).map_err(|e| {
            AppError::Internal(anyhow!(
                "Unexpected response format from the inference server: {} - Response body: {}",
                e,
                response_body
            ))
        })?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Create a model from a modelfile
    pub async fn create_model(&self, name: &str, modelfile: &str) -> Result<(), AppError> {
        let request_body = CreateModelRequest {
            name,
            modelfile,
            stream: false,
        };

        let response = self
            .http
            .post(self.url("/api/create"))
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() != StatusCode::OK {
            return Err(Self::server_error(response).await);
        }

        let response_body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: CreateModelResponse = serde_json::from_str(&response_body).map_err(|e| {
            AppError::Internal(anyhow!(
                "Failed to parse create response: {} - Response body: {}",
                e,
                response_body
            ))
        })?;

        if parsed.status != "success" {
            return Err(AppError::Server {
                status: StatusCode::OK.as_u16(),
                body: format!(
                    "Model created, but the response format was not as expected: {}",
                    response_body
                ),
            });
        }

        tracing::info!(model = %name, "Model created on inference server");
        Ok(())
    }

    /// Delete a model from the server
    ///
    /// A 404 is reported as `NotFoundOnServer` so callers can tell it apart
    /// from other failures.
    pub async fn delete_model(&self, name: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.url("/api/delete"))
            .timeout(self.timeout)
            .json(&DeleteModelRequest { name })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => {
                tracing::info!(model = %name, "Model deleted on inference server");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(AppError::NotFoundOnServer(name.to_string())),
            _ => Err(Self::server_error(response).await),
        }
    }
}
