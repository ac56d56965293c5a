use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::export::RenderError;
use crate::extraction::ExtractionError;
use crate::llm_client::LlmError;

/// Application-level error type. Every variant is scoped to one pipeline run;
/// none of them stop the server.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Oversized upload. Reported as a warning rather than an error.
    #[error("{0}")]
    FileTooLarge(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Error occurred during text extraction: {0}")]
    Extraction(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Error generating PDF: {0}")]
    Render(#[from] RenderError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps an LLM failure during `stage` to the message shown to the user.
    pub fn llm(stage: &str, e: &LlmError) -> Self {
        let kind = if e.is_bad_request() {
            "Bad Request Error"
        } else if matches!(e, LlmError::Api { .. }) {
            "API Error"
        } else {
            "An unexpected error"
        };
        AppError::Llm(format!(
            "{kind} occurred while {stage}. Error details: {e}"
        ))
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::TooLarge { .. } => AppError::FileTooLarge(e.to_string()),
            other => AppError::Extraction(other.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::FileTooLarge(
                "File size exceeds the limit of 5MB. Please upload a smaller file.".to_string(),
            )
        } else {
            AppError::Validation(format!("Malformed upload: {}", e.body_text()))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, level, message) = match &self {
            AppError::FileTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "FILE_TOO_LARGE",
                "warning",
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "error",
                msg.clone(),
            ),
            AppError::Extraction(msg) => {
                tracing::warn!("Extraction failed: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "EXTRACTION_ERROR",
                    "error",
                    self.to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (StatusCode::BAD_GATEWAY, "LLM_ERROR", "error", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "DATABASE_ERROR",
                    "error",
                    "Error occurred while storing the assessment".to_string(),
                )
            }
            AppError::Render(e) => {
                tracing::error!("Render error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RENDER_ERROR",
                    "error",
                    self.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "error",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "level": level,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
