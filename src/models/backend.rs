//! Model backend seam and the Ollama wire types it speaks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ModelParameters;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("Backend reported an error: {0}")]
    Remote(String),
}

impl BackendError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// One entry of `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<RemoteModel>,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: ModelParameters,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// One line of the `POST /api/pull` progress stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionResponse {
    #[serde(default)]
    pub version: Option<String>,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&PullProgress) + Send + Sync);

/// Everything the registry needs from a live model server. `base` is the
/// server root (`aiProvider.url`), read fresh for every call.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn list_models(&self, base: &Url) -> Result<Vec<RemoteModel>, BackendError>;

    async fn generate(&self, base: &Url, request: &GenerateRequest) -> Result<GenerateResponse, BackendError>;

    /// Streams progress into `progress` until the pull finishes or fails.
    async fn pull(&self, base: &Url, name: &str, progress: ProgressFn<'_>) -> Result<(), BackendError>;

    async fn delete(&self, base: &Url, name: &str) -> Result<(), BackendError>;

    async fn version(&self, base: &Url) -> Result<String, BackendError>;
}
