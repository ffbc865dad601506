//! Model registry: reconciles configured models with what the Ollama server
//! actually has, probes availability and drives pull/delete.
//!
//! All persistent state lives in the [`ConfigStore`]; the registry only owns a
//! short-lived discovery cache.

pub mod backend;
pub mod format;
pub mod mock;
pub mod ollama;

pub use backend::{BackendError, GenerateRequest, GenerateResponse, ModelBackend, PullProgress, RemoteModel};
pub use mock::{MockBackend, VersionReply};
pub use ollama::OllamaClient;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::{ConfigError, ConfigStore, ModelDescriptor, ModelParameters};
use crate::notify::{ChangeNotifier, SubscriptionId};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Model '{name}' not found")]
    ModelNotFound { name: String },
    #[error("Model '{name}' is not available or not working")]
    ModelUnavailable { name: String },
    #[error("Cannot remove the current default model '{name}'")]
    CannotRemoveDefault { name: String },
    #[error("Backend request failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Configuration error: {0}")]
    Config(ConfigError),
}

impl From<ConfigError> for RegistryError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ModelNotFound { name } => RegistryError::ModelNotFound { name },
            ConfigError::CannotRemoveDefault { name } => RegistryError::CannotRemoveDefault { name },
            other => RegistryError::Config(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Discovered { count: usize },
    Switched { from: Option<String>, to: String },
    ParametersUpdated { name: String },
    Pulled { name: String },
    Deleted { name: String },
    CacheCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// How long a successful discovery stays fresh.
    pub cache_ttl: Duration,
    /// Upper bound for discovery, probes and version checks.
    pub probe_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryCache {
    pub entries: Vec<ModelDescriptor>,
    pub last_discovered_at: Option<DateTime<Local>>,
}

impl DiscoveryCache {
    fn is_fresh(&self, now: DateTime<Local>, ttl: Duration) -> bool {
        match self.last_discovered_at {
            None => false,
            // A clock that went backwards counts as fresh.
            Some(at) => (now - at).to_std().map(|elapsed| elapsed <= ttl).unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OllamaStatus {
    Running { version: String, url: String },
    /// Server answered with a non-success status.
    Error { error: String, url: String },
    Offline { error: String, url: String },
}

impl OllamaStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, OllamaStatus::Running { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealth {
    pub name: String,
    pub display_name: String,
    pub available: bool,
    /// Result of a live one-token probe.
    pub healthy: bool,
    pub auto_discovered: bool,
    pub is_current: bool,
    pub size: String,
    pub last_checked: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub total: usize,
    pub available: usize,
    pub unavailable: usize,
    pub configured: usize,
    pub auto_discovered: usize,
    pub current: Option<String>,
    pub cache_age_secs: Option<i64>,
}

/// Generation defaults applied to a freshly discovered model.
pub fn discovered_parameters() -> ModelParameters {
    [
        ("temperature", Number::from_f64(0.8)),
        ("num_predict", Some(Number::from(150))),
        ("top_p", Number::from_f64(0.9)),
        ("top_k", Some(Number::from(40))),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
    .collect()
}

fn describe_remote(remote: &RemoteModel) -> ModelDescriptor {
    ModelDescriptor {
        display_name: format::display_name(&remote.name),
        description: format!("Ollama model ({})", format::format_size(remote.size)),
        parameters: discovered_parameters(),
        available: Some(true),
        size: remote.size,
        modified_at: remote.modified_at.clone(),
        ..ModelDescriptor::new(format::strip_tag(&remote.name))
    }
}

/// Configured entries first, in order, with discovery facts folded in;
/// unknown discovered models are appended and flagged. Entries whose
/// availability is still unknown are reported unavailable.
pub fn merge_models(configured: Vec<ModelDescriptor>, discovered: &[ModelDescriptor]) -> Vec<ModelDescriptor> {
    let mut seen: HashSet<String> = configured.iter().map(|m| m.name.clone()).collect();
    let mut merged = configured;

    for found in discovered {
        if seen.contains(&found.name) {
            if let Some(model) = merged.iter_mut().find(|m| m.name == found.name) {
                model.available = found.available.or(Some(true));
                if found.size.is_some() {
                    model.size = found.size;
                }
                if found.modified_at.is_some() {
                    model.modified_at = found.modified_at.clone();
                }
            }
        } else {
            seen.insert(found.name.clone());
            merged.push(ModelDescriptor {
                auto_discovered: Some(true),
                ..found.clone()
            });
        }
    }

    for model in &mut merged {
        model.available.get_or_insert(false);
    }
    merged
}

pub struct ModelRegistry {
    config: Arc<ConfigStore>,
    backend: Arc<dyn ModelBackend>,
    clock: Arc<dyn Clock>,
    settings: RegistrySettings,
    cache: Mutex<DiscoveryCache>,
    events: ChangeNotifier<ModelEvent>,
}

impl ModelRegistry {
    pub fn new(
        config: Arc<ConfigStore>,
        backend: Arc<dyn ModelBackend>,
        clock: Arc<dyn Clock>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            config,
            backend,
            clock,
            settings,
            cache: Mutex::new(DiscoveryCache::default()),
            events: ChangeNotifier::new(),
        }
    }

    fn cache(&self) -> MutexGuard<'_, DiscoveryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn provider_url(&self) -> Result<Url, RegistryError> {
        let raw: String = self.config.get_as("aiProvider.url")?.unwrap_or_default();
        Url::parse(&raw).map_err(|e| BackendError::InvalidUrl(format!("{}: {}", raw, e)).into())
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.settings.probe_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.settings.probe_timeout)),
        }
    }

    /* ---------- DISCOVERY ---------- */

    /// Asks the server which models it has. The cache is refreshed only on
    /// success.
    #[instrument(skip(self))]
    pub async fn try_discover_models(&self) -> Result<Vec<ModelDescriptor>, RegistryError> {
        let base = self.provider_url()?;
        let remote = self.bounded(self.backend.list_models(&base)).await?;
        let discovered: Vec<ModelDescriptor> = remote.iter().map(describe_remote).collect();

        {
            let mut cache = self.cache();
            cache.entries = discovered.clone();
            cache.last_discovered_at = Some(self.clock.now());
        }
        info!(count = discovered.len(), "Discovered Ollama models");
        self.events.notify(&ModelEvent::Discovered {
            count: discovered.len(),
        });
        Ok(discovered)
    }

    /// Like [`try_discover_models`](Self::try_discover_models) but a failure
    /// is logged and yields an empty list.
    pub async fn discover_models(&self) -> Vec<ModelDescriptor> {
        match self.try_discover_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "Model discovery failed");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_all_models(&self) -> Result<Vec<ModelDescriptor>, RegistryError> {
        let configured = self.config.available_models()?;
        if !self.config.features()?.auto_discover_models {
            return Ok(merge_models(configured, &[]));
        }

        let cached = {
            let cache = self.cache();
            cache
                .is_fresh(self.clock.now(), self.settings.cache_ttl)
                .then(|| cache.entries.clone())
        };
        let discovered = match cached {
            Some(entries) => {
                debug!("Using cached discovery results");
                entries
            }
            None => self.discover_models().await,
        };
        Ok(merge_models(configured, &discovered))
    }

    pub fn cache_snapshot(&self) -> DiscoveryCache {
        self.cache().clone()
    }

    pub fn clear_cache(&self) {
        *self.cache() = DiscoveryCache::default();
        info!("Model cache cleared");
        self.events.notify(&ModelEvent::CacheCleared);
    }

    /* ---------- VALIDATION & SELECTION ---------- */

    /// One-token generation probe. Any failure means "not available".
    #[instrument(skip(self))]
    pub async fn validate_model(&self, name: &str) -> bool {
        let base = match self.provider_url() {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "Cannot probe model");
                return false;
            }
        };
        let request = GenerateRequest {
            model: name.to_string(),
            prompt: "Test".to_string(),
            stream: false,
            options: [("num_predict".to_string(), Number::from(1))].into_iter().collect(),
        };

        match self.bounded(self.backend.generate(&base, &request)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(model = name, error = %e, "Model validation failed");
                false
            }
        }
    }

    pub fn get_current_model(&self) -> Result<Option<ModelDescriptor>, RegistryError> {
        Ok(self.config.get_current_model()?)
    }

    #[instrument(skip(self))]
    pub async fn switch_model(&self, name: &str) -> Result<(), RegistryError> {
        if self.config.features()?.model_validation && !self.validate_model(name).await {
            return Err(RegistryError::ModelUnavailable { name: name.to_string() });
        }

        let from = self.config.get_current_model()?.map(|m| m.name);
        self.config.set_current_model(name)?;
        info!(model = name, "Switched model");
        self.events.notify(&ModelEvent::Switched {
            from,
            to: name.to_string(),
        });
        Ok(())
    }

    /// Shallow-merges `parameters` into the stored entry for `name`.
    pub fn update_model_parameters(&self, name: &str, parameters: ModelParameters) -> Result<(), RegistryError> {
        let models = self.config.available_models()?;
        let (index, model) = models
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .ok_or_else(|| RegistryError::ModelNotFound { name: name.to_string() })?;

        let mut merged = model.parameters.clone();
        merged.extend(parameters);
        let merged: serde_json::Map<String, Value> = merged.into_iter().map(|(k, v)| (k, Value::Number(v))).collect();

        self.config
            .set(&format!("aiProvider.availableModels.{}.parameters", index), Value::Object(merged))?;
        info!(model = name, "Updated model parameters");
        self.events.notify(&ModelEvent::ParametersUpdated { name: name.to_string() });
        Ok(())
    }

    /* ---------- LIFECYCLE ---------- */

    /// Downloads `name` on the server, then records it in the configuration
    /// under exactly that name, tag included.
    #[instrument(skip(self))]
    pub async fn pull_model(&self, name: &str) -> Result<(), RegistryError> {
        let base = self.provider_url()?;
        let report = |p: &PullProgress| {
            if let Some(status) = &p.status {
                debug!(model = name, status = %status, completed = ?p.completed, total = ?p.total, "Pull progress");
            }
        };
        self.backend.pull(&base, name, &report).await?;

        self.config.add_model(ModelDescriptor {
            display_name: format::display_name(name),
            description: "Ollama model (pulled)".to_string(),
            parameters: discovered_parameters(),
            available: Some(true),
            pulled: Some(true),
            ..ModelDescriptor::new(name)
        })?;
        self.invalidate();
        info!(model = name, "Pulled model");
        self.events.notify(&ModelEvent::Pulled { name: name.to_string() });
        Ok(())
    }

    /// Deletes `name` on the server and drops it from the configuration.
    /// The current default can never be deleted.
    #[instrument(skip(self))]
    pub async fn delete_model(&self, name: &str) -> Result<(), RegistryError> {
        let current: Option<String> = self.config.get_as("aiProvider.defaultModel")?;
        if current.as_deref() == Some(name) {
            return Err(RegistryError::CannotRemoveDefault { name: name.to_string() });
        }

        let base = self.provider_url()?;
        self.backend.delete(&base, name).await?;

        if self.config.available_models()?.iter().any(|m| m.name == name) {
            self.config.remove_model(name)?;
        } else {
            debug!(model = name, "Deleted model was not configured");
        }
        self.invalidate();
        info!(model = name, "Deleted model");
        self.events.notify(&ModelEvent::Deleted { name: name.to_string() });
        Ok(())
    }

    fn invalidate(&self) {
        self.cache().last_discovered_at = None;
    }

    /* ---------- STATUS ---------- */

    #[instrument(skip(self))]
    pub async fn get_ollama_status(&self) -> OllamaStatus {
        let url: String = self
            .config
            .get_as("aiProvider.url")
            .ok()
            .flatten()
            .unwrap_or_default();
        let base = match self.provider_url() {
            Ok(base) => base,
            Err(e) => return OllamaStatus::Offline { error: e.to_string(), url },
        };

        match self.bounded(self.backend.version(&base)).await {
            Ok(version) => OllamaStatus::Running { version, url },
            Err(BackendError::Http { status, .. }) => OllamaStatus::Error {
                error: format!("HTTP {}", status),
                url,
            },
            Err(e) => OllamaStatus::Offline { error: e.to_string(), url },
        }
    }

    /// Probes every merged model in turn.
    pub async fn get_model_health(&self) -> Result<Vec<ModelHealth>, RegistryError> {
        let current = self.config.get_current_model()?.map(|m| m.name);
        let mut report = Vec::new();
        for model in self.get_all_models().await? {
            let healthy = self.validate_model(&model.name).await;
            report.push(ModelHealth {
                is_current: current.as_deref() == Some(model.name.as_str()),
                available: model.is_available(),
                healthy,
                auto_discovered: model.is_auto_discovered(),
                size: format::format_size(model.size),
                display_name: model.display_name,
                name: model.name,
                last_checked: self.clock.now(),
            });
        }
        Ok(report)
    }

    /// Counts over the configured list. Never touches the network.
    pub fn get_model_stats(&self) -> Result<ModelStats, RegistryError> {
        let cache_age_secs = self
            .cache()
            .last_discovered_at
            .map(|at| (self.clock.now() - at).num_seconds());
        let models = self.config.available_models()?;
        let available = models.iter().filter(|m| m.is_available()).count();
        let auto_discovered = models.iter().filter(|m| m.is_auto_discovered()).count();

        Ok(ModelStats {
            total: models.len(),
            available,
            unavailable: models.len() - available,
            configured: models.len() - auto_discovered,
            auto_discovered,
            current: self.config.get_current_model()?.map(|m| m.name),
            cache_age_secs,
        })
    }
}

#[cfg(test)]
mod tests;
