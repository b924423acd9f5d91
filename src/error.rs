use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to fetch scenes: {message}")]
    FetchFailed { message: String },

    #[error("failed to write scenes: {message}")]
    WriteFailed { message: String },

    #[error("scene not found: {scene_id}")]
    SceneNotFound { scene_id: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::repository", %message, "fetch failed");
        AppError::FetchFailed { message }
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::repository", %message, "write failed");
        AppError::WriteFailed { message }
    }

    pub fn scene_not_found(scene_id: impl Into<String>) -> Self {
        let scene_id = scene_id.into();
        warn!(target: "app::repository", %scene_id, "scene not found");
        AppError::SceneNotFound { scene_id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}
