use crate::errors::{ChatError, ChatResult};
use crate::types::PayloadFormat;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "BOOKCHAT_API_URL";
pub const ENV_SESSION_ID: &str = "BOOKCHAT_SESSION_ID";
pub const ENV_TIMEOUT_SECS: &str = "BOOKCHAT_TIMEOUT_SECS";

/// Configuration for the chat client
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the backend API, e.g. `http://127.0.0.1:8000/api/v1`
    pub api_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub streaming: Option<bool>,
    pub payload_format: Option<PayloadFormat>,
    /// Pinned session id; a fresh one is generated when absent
    pub session_id: Option<String>,
    pub log_level: Option<String>,
}

impl ChatConfig {
    /// Built-in values for every field
    pub fn defaults() -> Self {
        Self {
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            streaming: Some(true),
            payload_format: Some(PayloadFormat::Auto),
            session_id: None,
            log_level: Some("warn".to_string()),
        }
    }

    /// Loads configuration from a file if it exists, otherwise returns an empty config
    pub fn load_from_file(path: &Path) -> ChatResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ChatError::ConfigError(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    /// Saves configuration to a file
    pub fn save_to_file(&self, path: &Path) -> ChatResult<()> {
        let content = toml::to_string(self)
            .map_err(|e| ChatError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ChatError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, content)
            .map_err(|e| ChatError::ConfigError(format!("Failed to write config file: {}", e)))
    }

    /// Reads the `BOOKCHAT_*` variables into a partial config
    pub fn from_env() -> ChatResult<Self> {
        let timeout_secs = match env::var(ENV_TIMEOUT_SECS) {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ChatError::ConfigError(format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            api_base_url: env::var(ENV_API_URL).ok().filter(|v| !v.trim().is_empty()),
            timeout_secs,
            session_id: env::var(ENV_SESSION_ID).ok().filter(|v| !v.trim().is_empty()),
            ..Self::default()
        })
    }

    /// Merges this config with another config, preferring values from the other config if present
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            api_base_url: other
                .api_base_url
                .clone()
                .or_else(|| self.api_base_url.clone()),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            streaming: other.streaming.or(self.streaming),
            payload_format: other.payload_format.or(self.payload_format),
            session_id: other.session_id.clone().or_else(|| self.session_id.clone()),
            log_level: other.log_level.clone().or_else(|| self.log_level.clone()),
        }
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat", self.api_base_url())
    }

    pub fn history_endpoint(&self, session_id: &str) -> String {
        format!("{}/history/{}", self.api_base_url(), session_id)
    }

    pub fn session_endpoint(&self, session_id: &str) -> String {
        format!("{}/session/{}", self.api_base_url(), session_id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn streaming(&self) -> bool {
        self.streaming.unwrap_or(true)
    }

    pub fn payload_format(&self) -> PayloadFormat {
        self.payload_format.unwrap_or_default()
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> ChatResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        ChatError::ConfigError("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> ChatResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
