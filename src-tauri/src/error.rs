//! Error types for the shell
//!
//! We use thiserror for ergonomic error definitions and implement
//! serde::Serialize so command errors reach the shell page as plain text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("Failed to start server: {0}")]
    ServerStart(String),

    #[error("Server exited unexpectedly: {0}")]
    ServerExited(String),

    #[error("Server panicked: {0}")]
    ServerPanicked(String),

    #[error("Embedded web view is not available")]
    EmbedUnavailable,

    #[error("Failed to create web view: {0}")]
    Embed(String),

    #[error("{opener} could not open browser: {reason}")]
    BrowserOpen { opener: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Internal error")]
    Internal(String),
}

impl AppError {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        AppError::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        AppError::InvalidUrl(error.to_string())
    }
}

// Serialize errors for the frontend: the full error goes to the log, the
// display message goes over IPC
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        log::error!("command failed: {:?}", self);
        serializer.serialize_str(&self.to_string())
    }
}
