use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use playback_core::FeederError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{message}")]
    Upstream { message: String, details: String },

    #[error("Playback error: {0}")]
    Playback(#[from] FeederError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Playback(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            ApiError::Playback(
                FeederError::Remote { .. } | FeederError::EmptyBody | FeederError::Read(_),
            ) => StatusCode::BAD_GATEWAY,
            ApiError::Playback(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_message, details) = match self {
            ApiError::InvalidInput(msg) => (msg, None),
            ApiError::Upstream { message, details } => {
                tracing::error!("{}: {}", message, details);
                (message, Some(details))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (msg, None)
            }
            ApiError::NotFound(msg) => (msg, None),
            other => (other.to_string(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
            details,
        });

        (status, body).into_response()
    }
}
