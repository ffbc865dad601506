use thiserror::Error;

use super::validation::ConfigValidationError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration not loaded. Call load() first.")]
    NotLoaded,
    #[error("Failed to load config from {url}: HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("Network error talking to {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ConfigValidationError),
    #[error("Model '{name}' not found in available models")]
    ModelNotFound { name: String },
    #[error("Cannot remove current default model '{name}'. Switch to another model first.")]
    CannotRemoveDefault { name: String },
    #[error("Invalid config path: {0}")]
    InvalidPath(String),
    #[error("Invalid prompt phase name '{phase}'")]
    InvalidPhase { phase: String },
}

impl ConfigError {
    pub(crate) fn transport(url: &str, err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "unable to connect".to_string()
        } else {
            err.to_string()
        };
        Self::Transport {
            url: url.to_string(),
            reason,
        }
    }
}
