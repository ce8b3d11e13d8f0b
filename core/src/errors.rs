use std::time::Duration;

use thiserror::Error;

/// Chat client errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Request Error: {0}")]
    RequestError(String),

    #[error("Response Error: {0}")]
    ResponseError(String),

    #[error("Parsing Error: {0}")]
    ParsingError(String),

    #[error("HTTP Error: {status_code} - {message}")]
    HttpError { status_code: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Short description shown to the user inside the conversation.
    ///
    /// Status failures read `Server error: <code>`; everything else falls
    /// back to the error's display text.
    pub fn display_for_chat(&self) -> String {
        match self {
            ChatError::HttpError { status_code, .. } => format!("Server error: {}", status_code),
            ChatError::Timeout(_) => "Request timed out".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ChatError::Timeout(_) => true,
            ChatError::ReqwestError(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
