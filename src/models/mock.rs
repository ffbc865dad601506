//! Scripted [`ModelBackend`] for offline runs and tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use super::backend::{BackendError, GenerateRequest, GenerateResponse, ModelBackend, ProgressFn, PullProgress, RemoteModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReply {
    Running(String),
    Status(u16),
    Offline,
}

#[derive(Debug)]
pub struct MockBackend {
    models: Mutex<Option<Vec<RemoteModel>>>,
    responsive: Mutex<HashSet<String>>,
    version: Mutex<VersionReply>,
    fail_mutations: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            models: Mutex::new(Some(Vec::new())),
            responsive: Mutex::new(HashSet::new()),
            version: Mutex::new(VersionReply::Running("0.1.0-mock".to_string())),
            fail_mutations: Mutex::new(false),
            delay: Mutex::new(None),
            calls: Mutex::new(BTreeMap::new()),
        }
    }
}

fn guard<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `names` from `/api/tags`; every listed model also answers probes.
    pub fn with_models(names: &[&str]) -> Self {
        let mock = Self::default();
        mock.set_models(names.iter().map(|n| RemoteModel {
            name: n.to_string(),
            size: Some(2 * 1024 * 1024 * 1024),
            modified_at: Some("2024-12-01T00:00:00Z".to_string()),
        }));
        for name in names {
            mock.set_responsive(super::format::strip_tag(name), true);
            mock.set_responsive(name, true);
        }
        mock
    }

    pub fn set_models(&self, models: impl IntoIterator<Item = RemoteModel>) {
        *guard(&self.models) = Some(models.into_iter().collect());
    }

    /// Makes `/api/tags` fail as if the server were down.
    pub fn fail_discovery(&self) {
        *guard(&self.models) = None;
    }

    pub fn set_responsive(&self, name: &str, responsive: bool) {
        let mut set = guard(&self.responsive);
        if responsive {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn set_version(&self, reply: VersionReply) {
        *guard(&self.version) = reply;
    }

    pub fn fail_mutations(&self, fail: bool) {
        *guard(&self.fail_mutations) = fail;
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *guard(&self.delay) = delay;
    }

    pub fn calls(&self, operation: &str) -> usize {
        guard(&self.calls).get(operation).copied().unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str) {
        *guard(&self.calls).entry(operation).or_insert(0) += 1;
        let delay = *guard(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn offline() -> BackendError {
        BackendError::Transport("connection refused".to_string())
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn list_models(&self, _base: &Url) -> Result<Vec<RemoteModel>, BackendError> {
        self.enter("list_models").await;
        guard(&self.models).clone().ok_or_else(Self::offline)
    }

    async fn generate(&self, _base: &Url, request: &GenerateRequest) -> Result<GenerateResponse, BackendError> {
        self.enter("generate").await;
        if guard(&self.responsive).contains(&request.model) {
            Ok(GenerateResponse {
                response: "Ho ho ho".to_string(),
            })
        } else {
            Err(BackendError::Http {
                status: 404,
                body: format!("model '{}' not found", request.model),
            })
        }
    }

    async fn pull(&self, _base: &Url, name: &str, progress: ProgressFn<'_>) -> Result<(), BackendError> {
        self.enter("pull").await;
        if *guard(&self.fail_mutations) {
            return Err(BackendError::Remote(format!("pull model manifest: {} does not exist", name)));
        }
        for status in ["pulling manifest", "downloading", "success"] {
            progress(&PullProgress {
                status: Some(status.to_string()),
                ..PullProgress::default()
            });
        }
        if let Some(models) = guard(&self.models).as_mut() {
            models.push(RemoteModel {
                name: name.to_string(),
                size: Some(1024 * 1024 * 1024),
                modified_at: None,
            });
        }
        self.set_responsive(name, true);
        Ok(())
    }

    async fn delete(&self, _base: &Url, name: &str) -> Result<(), BackendError> {
        self.enter("delete").await;
        if *guard(&self.fail_mutations) {
            return Err(BackendError::Http {
                status: 500,
                body: "delete failed".to_string(),
            });
        }
        if let Some(models) = guard(&self.models).as_mut() {
            models.retain(|m| m.name != name);
        }
        self.set_responsive(name, false);
        Ok(())
    }

    async fn version(&self, _base: &Url) -> Result<String, BackendError> {
        self.enter("version").await;
        match guard(&self.version).clone() {
            VersionReply::Running(v) => Ok(v),
            VersionReply::Status(status) => Err(BackendError::Http {
                status,
                body: String::new(),
            }),
            VersionReply::Offline => Err(Self::offline()),
        }
    }
}
