//! HTTP-facing error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::import_service::ImportError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Several validation messages reported at once (password checks).
    #[error("{}", .0.join(" "))]
    ValidationList(Vec<String>),

    #[error("authentication required")]
    Unauthenticated,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("service temporarily unavailable")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::ValidationList(_) => StatusCode::BAD_REQUEST,
            AppError::Import(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::ValidationList(_) => "validation",
            AppError::Import(_) => "import",
            AppError::Unauthenticated | AppError::InvalidCredentials => "authentication",
            AppError::Forbidden(_) => "permission",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Unavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to return to the client.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "An internal error occurred. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!("Internal error: {e:#}"),
            AppError::Unavailable(detail) => tracing::error!("Service unavailable: {detail}"),
            AppError::Import(ImportError::Unreadable(detail)) => {
                tracing::warn!("Unreadable upload: {detail}")
            }
            _ => {}
        }

        let mut body = serde_json::json!({
            "error": {
                "category": self.category(),
                "message": self.public_message(),
            }
        });
        if let AppError::ValidationList(messages) = &self {
            body["error"]["details"] = serde_json::json!(messages);
        }

        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
