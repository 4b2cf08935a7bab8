//! # Web API Error Types
//!
//! Defines error types specific to the web API and their HTTP response
//! conversions. Leverages thiserror for structured error handling and Axum's
//! IntoResponse for HTTP conversion.

use crate::error::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Web API specific errors with HTTP status code mappings.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(resource) => ApiError::NotFound { resource },
            EngineError::Validation(message) | EngineError::InvalidTransition(message) => {
                ApiError::BadRequest { message }
            }
            EngineError::Conflict(message) => ApiError::Conflict { message },
            EngineError::Unauthorized(_) => ApiError::Unauthorized,
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_code, message) = match &self {
            ApiError::NotFound { resource } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            ApiError::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message.clone())
            }
            ApiError::Conflict { message } => (StatusCode::CONFLICT, "CONFLICT", message.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                message.clone(),
            ),
        };

        let error_response = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}
