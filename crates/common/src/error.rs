use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Streaming platform error ({platform}): {message}")]
    Platform { platform: String, message: String },

    #[error("Notification error ({channel_type}): {message}")]
    Notification {
        channel_type: String,
        message: String,
    },

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn platform(platform: impl std::fmt::Display, message: impl Into<String>) -> Self {
        AppError::Platform {
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    pub fn notification(channel_type: impl std::fmt::Display, message: impl Into<String>) -> Self {
        AppError::Notification {
            channel_type: channel_type.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}
