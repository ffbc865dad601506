//! UI-facing entry points. Every call returns `Result<T, String>` so a view
//! layer can show the message as-is.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigStore, ConfigSummary, ModelDescriptor, MemoryConfigStore};
use crate::models::{ModelBackend, ModelRegistry, OllamaClient, OllamaStatus, RegistrySettings};
use crate::prompts::{LiveStats, PromptEngine, TemplateValidation, UserLocation};
use crate::settings::Settings;

fn report(context: &str, e: impl std::fmt::Display) -> String {
    error!(error = %e, "{}", context);
    e.to_string()
}

/// The three components, wired once and shared by every view.
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub models: Arc<ModelRegistry>,
    pub prompts: Arc<PromptEngine>,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigStore>,
        backend: Arc<dyn ModelBackend>,
        clock: Arc<dyn Clock>,
        registry: RegistrySettings,
    ) -> Self {
        let models = Arc::new(ModelRegistry::new(
            Arc::clone(&config),
            backend,
            Arc::clone(&clock),
            registry,
        ));
        let prompts = Arc::new(PromptEngine::with_default_providers(Arc::clone(&config), clock));
        Self { config, models, prompts }
    }

    /// Real clock, Ollama over HTTP, configuration from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        let config = settings.config_store().map_err(|e| report("Failed to build configuration store", e))?;
        let backend = OllamaClient::new().map_err(|e| report("Failed to build Ollama client", e))?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(backend),
            Arc::new(SystemClock),
            settings.registry(),
        ))
    }

    /// No network at all: an in-memory document and the given backend.
    pub fn offline(document: Value, backend: Arc<dyn ModelBackend>) -> Self {
        let config = ConfigStore::with_backend(Arc::new(MemoryConfigStore::with_document(document)));
        Self::new(Arc::new(config), backend, Arc::new(SystemClock), RegistrySettings::default())
    }

    /* ---------- 1.  CONFIGURATION ---------- */

    /// `Err` means the default document was installed instead.
    pub async fn load_config(&self) -> Result<ConfigSummary, String> {
        self.config.load().await.map_err(|e| e.to_string())?;
        Ok(self.config.summary())
    }

    pub fn config_summary(&self) -> ConfigSummary {
        self.config.summary()
    }

    pub fn get_config_value(&self, path: &str) -> Result<Option<Value>, String> {
        self.config.get(path).map_err(|e| e.to_string())
    }

    pub fn set_config_value(&self, path: &str, value: Value) -> Result<(), String> {
        self.config.set(path, value).map_err(|e| report("Failed to update configuration", e))
    }

    pub async fn save_config(&self) -> Result<String, String> {
        self.config.save().await.map_err(|e| e.to_string())?;
        Ok("Configuration saved".to_string())
    }

    pub fn export_config(&self) -> Result<String, String> {
        self.config.export().map_err(|e| e.to_string())
    }

    pub fn import_config(&self, serialized: &str) -> Result<String, String> {
        self.config.import(serialized).map_err(|e| e.to_string())?;
        Ok("Configuration imported".to_string())
    }

    pub fn reset_config(&self) -> Result<String, String> {
        self.config.reset();
        Ok("Configuration reset".to_string())
    }

    /* ---------- 2.  MODELS ---------- */

    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, String> {
        self.models.get_all_models().await.map_err(|e| report("Failed to list models", e))
    }

    pub async fn switch_model(&self, name: &str) -> Result<String, String> {
        self.models.switch_model(name).await.map_err(|e| report("Failed to switch model", e))?;
        Ok(format!("Switched to {}", name))
    }

    pub async fn ollama_status(&self) -> OllamaStatus {
        self.models.get_ollama_status().await
    }

    pub async fn pull_model(&self, name: &str) -> Result<String, String> {
        self.models.pull_model(name).await.map_err(|e| report("Failed to pull model", e))?;
        Ok(format!("Pulled {}", name))
    }

    pub async fn delete_model(&self, name: &str) -> Result<String, String> {
        self.models.delete_model(name).await.map_err(|e| report("Failed to delete model", e))?;
        Ok(format!("Deleted {}", name))
    }

    /* ---------- 3.  PROMPTS ---------- */

    pub fn santa_message(&self, stats: Option<LiveStats>, location: Option<UserLocation>) -> String {
        self.prompts.generate_santa_message(stats.as_ref(), location.as_ref())
    }

    pub fn update_prompt(&self, phase: &str, template: &str) -> Result<TemplateValidation, String> {
        let validation = self.prompts.validate_template(template);
        if !validation.is_valid {
            return Err(validation
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "));
        }
        self.prompts
            .set_template(phase, template)
            .map_err(|e| report("Failed to update prompt", e))?;
        Ok(validation)
    }

    pub fn preview_prompt(&self, phase: &str, sample: Value) -> String {
        let sample = match sample {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.prompts.preview_prompt(phase, &sample)
    }
}
