//! Error types and error handling for the relay
//!
//! Every component returns `AppError`. The HTTP layer converts it into a JSON
//! response through `IntoResponse`; the command layer renders it as an error
//! embed for the chat platform.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad, duplicate or missing input (model name, message, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The inference server or platform API could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote API answered with a non-success status
    #[error("Server returned HTTP {status}: {body}")]
    Server {
        /// HTTP status code returned by the server
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// The inference server does not know the requested model
    #[error("Model '{0}' not found on server")]
    NotFoundOnServer(String),

    /// The inference call did not finish within the configured timeout
    #[error("Inference timed out after {0} seconds")]
    Timeout(u64),

    /// Persistence I/O failure (SQLite or the model list file)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A partial write could not be rolled back; history needs attention
    #[error("Conversation history left inconsistent: {0}")]
    HistoryInconsistent(String),

    /// The pager was locked after its idle timeout
    #[error("Expired: {0}")]
    Expired(String),

    /// A referenced resource (pager id, ...) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The exchange was cancelled before anything was persisted
    #[error("Exchange cancelled before completion")]
    Cancelled,

    /// Internal error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status used when the error is returned by the API layer
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Server { .. } => StatusCode::BAD_GATEWAY,
            AppError::NotFoundOnServer(_) => StatusCode::NOT_FOUND,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HistoryInconsistent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_keeps_body_verbatim() {
        let err = AppError::Server {
            status: 500,
            body: r#"{"error":"model 'x' is busy"}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"Server returned HTTP 500: {"error":"model 'x' is busy"}"#
        );
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_not_found_on_server_message() {
        let err = AppError::NotFoundOnServer("llama3".to_string());
        assert!(err.to_string().contains("not found on server"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_expired_maps_to_gone() {
        let err = AppError::Expired("pager locked".to_string());
        assert_eq!(err.status_code(), StatusCode::GONE);
        assert_eq!(AppError::Timeout(5).status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
