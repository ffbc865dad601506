//! Single authoritative configuration document.
//!
//! [`ConfigStore`] loads the document from a [`ConfigSource`], validates it,
//! hands out dot-path reads and writes, persists through a [`ConfigSink`] and
//! tells subscribers about every state transition.
//!
//! ```text
//! load() ──ok──► validated document ──► config-loaded
//!    └──err──► embedded default   ──► config-fallback   (error still returned)
//! set()/add_model()/... ──► config-changed ──► autosave (if features.configAutoSave)
//! ```

pub mod errors;
pub mod memory;
pub mod path;
pub mod schema;
pub mod source;
pub mod validation;

pub use errors::ConfigError;
pub use memory::MemoryConfigStore;
pub use schema::{
    default_document, AiProvider, Features, ModelDescriptor, ModelParameters, SantaConfig, ServerSection,
    UiOptions, REQUIRED_PROMPTS,
};
pub use source::{ConfigSink, ConfigSource, FileConfigStore, FileFormat, HttpConfigEndpoint};
pub use validation::{collect_violations, validate_document, ConfigValidationError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, instrument, warn};

use crate::notify::{ChangeNotifier, SubscriptionId};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    Loaded { document: Value },
    /// `load` failed and the embedded default took over.
    FallbackApplied { reason: String },
    Changed { path: String, value: Value, snapshot: Value },
    Saved { document: Value },
    SaveFailed { reason: String },
    Imported { old: Option<Value>, new: Value },
    Reset { old: Option<Value>, new: Value },
}

impl ConfigEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConfigEvent::Loaded { .. } => "config-loaded",
            ConfigEvent::FallbackApplied { .. } => "config-fallback",
            ConfigEvent::Changed { .. } => "config-changed",
            ConfigEvent::Saved { .. } => "config-saved",
            ConfigEvent::SaveFailed { .. } => "config-save-failed",
            ConfigEvent::Imported { .. } => "config-imported",
            ConfigEvent::Reset { .. } => "config-reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub is_loaded: bool,
    pub current_model: Option<String>,
    pub available_models: usize,
    pub provider: Option<String>,
    pub server_url: Option<String>,
    pub features: Option<Features>,
}

struct StoreState {
    document: Value,
    loaded: bool,
    /// Bumped on every document change.
    revision: u64,
}

impl StoreState {
    fn replace(&mut self, document: Value) {
        self.document = document;
        self.loaded = true;
        self.revision += 1;
    }
}

type SharedState = Arc<RwLock<StoreState>>;

fn read_state(state: &RwLock<StoreState>) -> RwLockReadGuard<'_, StoreState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

/// Serializes every write to the sink. Holds the revision last persisted.
type SaveLock = Arc<AsyncMutex<u64>>;

pub struct ConfigStore {
    state: SharedState,
    source: Arc<dyn ConfigSource>,
    sink: Arc<dyn ConfigSink>,
    events: Arc<ChangeNotifier<ConfigEvent>>,
    save_lock: SaveLock,
}

impl ConfigStore {
    pub fn new(source: Arc<dyn ConfigSource>, sink: Arc<dyn ConfigSink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState {
                document: Value::Null,
                loaded: false,
                revision: 0,
            })),
            source,
            sink,
            events: Arc::new(ChangeNotifier::new()),
            save_lock: Arc::new(AsyncMutex::new(0)),
        }
    }

    /// Uses one backend as both source and sink.
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: ConfigSource + ConfigSink + 'static,
    {
        let source: Arc<dyn ConfigSource> = backend.clone();
        let sink: Arc<dyn ConfigSink> = backend;
        Self::new(source, sink)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        read_state(&self.state)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /* ---------- EVENTS ---------- */

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ConfigEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Subscribes to a single event name such as `"config-changed"`.
    pub fn on<F>(&self, event: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&ConfigEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(move |e| {
            if e.name() == event {
                listener(e)
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /* ---------- LIFECYCLE ---------- */

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    /// Fetches and validates the document. On any failure the embedded
    /// default is installed and the original error is still returned.
    #[instrument(skip(self), fields(source = %self.source.describe()))]
    pub async fn load(&self) -> Result<Value, ConfigError> {
        let fetched = self.source.fetch().await.and_then(|document| {
            validate_document(&document)?;
            Ok(document)
        });

        match fetched {
            Ok(document) => {
                self.write().replace(document.clone());
                info!("Configuration loaded successfully");
                self.events.notify(&ConfigEvent::Loaded {
                    document: document.clone(),
                });
                Ok(document)
            }
            Err(e) => {
                error!(error = %e, "Failed to load configuration; using default");
                self.write().replace(default_document());
                self.events.notify(&ConfigEvent::FallbackApplied { reason: e.to_string() });
                Err(e)
            }
        }
    }

    pub fn validate(document: &Value) -> Result<(), ConfigValidationError> {
        validate_document(document)
    }

    /* ---------- PATH ACCESS ---------- */

    /// `Ok(None)` when any segment of `path` is absent.
    pub fn get(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        let state = self.read();
        if !state.loaded {
            return Err(ConfigError::NotLoaded);
        }
        Ok(path::get_path(&state.document, path).cloned())
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        self.get(path)?
            .map(|v| serde_json::from_value(v).map_err(|e| ConfigError::Parse(format!("{}: {}", path, e))))
            .transpose()
    }

    /// Writes `value` at `path`, notifies `config-changed`, then autosaves if
    /// enabled. A failed autosave never undoes the write.
    pub fn set(&self, path: &str, value: Value) -> Result<(), ConfigError> {
        let snapshot = {
            let mut state = self.write();
            if !state.loaded {
                return Err(ConfigError::NotLoaded);
            }
            path::set_path(&mut state.document, path, value.clone())?;
            state.revision += 1;
            state.document.clone()
        };

        debug!(path = path, "Configuration value changed");
        self.events.notify(&ConfigEvent::Changed {
            path: path.to_string(),
            value,
            snapshot: snapshot.clone(),
        });
        self.autosave(snapshot);
        Ok(())
    }

    /* ---------- PERSISTENCE ---------- */

    /// Persists the current document. Writes are serialized with autosave,
    /// so the sink always ends up holding the latest document.
    pub async fn save(&self) -> Result<(), ConfigError> {
        let mut persisted = self.save_lock.lock().await;
        let (document, revision) = {
            let state = self.read();
            if !state.loaded {
                return Err(ConfigError::NotLoaded);
            }
            (state.document.clone(), state.revision)
        };
        persist(&self.sink, &self.events, document).await?;
        *persisted = revision;
        Ok(())
    }

    fn autosave(&self, snapshot: Value) {
        if !autosave_enabled(&snapshot) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = Arc::clone(&self.state);
                let sink = Arc::clone(&self.sink);
                let events = Arc::clone(&self.events);
                let save_lock = Arc::clone(&self.save_lock);
                handle.spawn(async move {
                    let mut persisted = save_lock.lock().await;
                    // Re-read under the lock: a newer change may have landed
                    // since this task was queued.
                    let (document, revision) = {
                        let state = read_state(&state);
                        (state.document.clone(), state.revision)
                    };
                    if revision == *persisted || !autosave_enabled(&document) {
                        return;
                    }
                    // Failures are already logged and published as config-save-failed.
                    if persist(&sink, &events, document).await.is_ok() {
                        *persisted = revision;
                    }
                });
            }
            Err(_) => warn!("No async runtime available; configuration autosave skipped"),
        }
    }

    pub fn export(&self) -> Result<String, ConfigError> {
        let state = self.read();
        if !state.loaded {
            return Err(ConfigError::NotLoaded);
        }
        serde_json::to_string_pretty(&state.document).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Replaces the document with `serialized` if it parses and validates;
    /// otherwise the current document is left untouched.
    pub fn import(&self, serialized: &str) -> Result<(), ConfigError> {
        let incoming: Value = serde_json::from_str(serialized).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Err(e) = validate_document(&incoming) {
            error!(error = %e, "Rejected configuration import");
            return Err(e.into());
        }

        let old = {
            let mut state = self.write();
            let old = state.loaded.then(|| state.document.clone());
            state.replace(incoming.clone());
            old
        };

        info!("Configuration imported successfully");
        self.events.notify(&ConfigEvent::Imported {
            old,
            new: incoming.clone(),
        });
        self.autosave(incoming);
        Ok(())
    }

    pub fn reset(&self) {
        let fresh = default_document();
        let old = {
            let mut state = self.write();
            let old = state.loaded.then(|| state.document.clone());
            state.replace(fresh.clone());
            old
        };

        info!("Configuration reset to defaults");
        self.events.notify(&ConfigEvent::Reset {
            old,
            new: fresh.clone(),
        });
        self.autosave(fresh);
    }

    /* ---------- MODELS ---------- */

    pub fn available_models(&self) -> Result<Vec<ModelDescriptor>, ConfigError> {
        Ok(self
            .get_as::<Vec<ModelDescriptor>>("aiProvider.availableModels")?
            .unwrap_or_default())
    }

    pub fn get_current_model(&self) -> Result<Option<ModelDescriptor>, ConfigError> {
        let current: Option<String> = self.get_as("aiProvider.defaultModel")?;
        let Some(current) = current else {
            return Ok(None);
        };
        Ok(self.available_models()?.into_iter().find(|m| m.name == current))
    }

    pub fn set_current_model(&self, name: &str) -> Result<(), ConfigError> {
        if !self.available_models()?.iter().any(|m| m.name == name) {
            return Err(ConfigError::ModelNotFound { name: name.to_string() });
        }
        self.set("aiProvider.defaultModel", Value::String(name.to_string()))?;
        info!(model = name, "Changed current model");
        Ok(())
    }

    /// Upserts by name. Fields present on `descriptor` override the stored
    /// entry; absent ones are kept.
    pub fn add_model(&self, descriptor: ModelDescriptor) -> Result<(), ConfigError> {
        let name = descriptor.name.clone();
        let incoming = serde_json::to_value(&descriptor).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        let mut models = match self.get("aiProvider.availableModels")? {
            Some(Value::Array(models)) => models,
            _ => Vec::new(),
        };

        let existing = models
            .iter_mut()
            .find(|m| m.get("name").and_then(Value::as_str) == Some(name.as_str()));
        match (existing, incoming) {
            (Some(Value::Object(stored)), Value::Object(fields)) => stored.extend(fields),
            (Some(stored), fields) => *stored = fields,
            (None, fields) => models.push(fields),
        }

        self.set("aiProvider.availableModels", Value::Array(models))?;
        info!(model = %name, "Added/updated model");
        Ok(())
    }

    pub fn remove_model(&self, name: &str) -> Result<(), ConfigError> {
        let models = self.available_models()?;
        let remaining: Vec<ModelDescriptor> = models.iter().filter(|m| m.name != name).cloned().collect();
        if remaining.len() == models.len() {
            return Err(ConfigError::ModelNotFound { name: name.to_string() });
        }

        let current: Option<String> = self.get_as("aiProvider.defaultModel")?;
        if current.as_deref() == Some(name) {
            return Err(ConfigError::CannotRemoveDefault { name: name.to_string() });
        }

        let remaining = serde_json::to_value(remaining).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        self.set("aiProvider.availableModels", remaining)?;
        info!(model = name, "Removed model");
        Ok(())
    }

    /* ---------- PROMPTS & OPTIONS ---------- */

    pub fn get_prompt(&self, phase: &str) -> Result<Option<String>, ConfigError> {
        check_phase(phase)?;
        Ok(self
            .get(&format!("prompts.{}", phase))?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub fn set_prompt(&self, phase: &str, text: &str) -> Result<(), ConfigError> {
        check_phase(phase)?;
        self.set(&format!("prompts.{}", phase), Value::String(text.to_string()))?;
        info!(phase = phase, "Updated prompt");
        Ok(())
    }

    pub fn features(&self) -> Result<Features, ConfigError> {
        self.section_or_default("features")
    }

    pub fn ui_options(&self) -> Result<UiOptions, ConfigError> {
        self.section_or_default("ui")
    }

    fn section_or_default<T: DeserializeOwned + Default>(&self, section: &str) -> Result<T, ConfigError> {
        match self.get(section)? {
            None => Ok(T::default()),
            Some(raw) => serde_json::from_value(raw).map_err(|e| {
                ConfigValidationError::InvalidSection {
                    section: section.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn summary(&self) -> ConfigSummary {
        if !self.is_loaded() {
            return ConfigSummary {
                is_loaded: false,
                current_model: None,
                available_models: 0,
                provider: None,
                server_url: None,
                features: None,
            };
        }

        ConfigSummary {
            is_loaded: true,
            current_model: self.get_current_model().ok().flatten().map(|m| m.name),
            available_models: self.available_models().map(|m| m.len()).unwrap_or(0),
            provider: self.get_as("aiProvider.type").ok().flatten(),
            server_url: self.get_as("aiProvider.url").ok().flatten(),
            features: self.features().ok(),
        }
    }
}

fn autosave_enabled(document: &Value) -> bool {
    path::get_path(document, "features.configAutoSave")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn check_phase(phase: &str) -> Result<(), ConfigError> {
    if phase.is_empty() || phase.contains('.') {
        return Err(ConfigError::InvalidPhase { phase: phase.to_string() });
    }
    Ok(())
}

async fn persist(
    sink: &Arc<dyn ConfigSink>,
    events: &ChangeNotifier<ConfigEvent>,
    document: Value,
) -> Result<(), ConfigError> {
    match sink.persist(&document).await {
        Ok(()) => {
            info!("Configuration saved successfully");
            events.notify(&ConfigEvent::Saved { document });
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Failed to save configuration");
            events.notify(&ConfigEvent::SaveFailed { reason: e.to_string() });
            Err(e)
        }
    }
}
