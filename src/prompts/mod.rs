//! Prompt rendering over the templates stored in the configuration.
//!
//! Context is layered, lowest precedence first: engine defaults, registered
//! providers, then whatever the caller passes. Rendering never fails from
//! the caller's point of view; a missing or broken template yields a canned
//! message for the phase.

pub mod context;
pub mod defaults;
pub mod template;

pub use context::{
    group_thousands, santa_message_context, santa_time_context, ContextProvider, LiveStats, Phase,
    SantaTimeContext, UserLocation,
};
pub use template::{
    analyze, extract_variables, interpolate, validate_template, Interpolation, TemplateAnalysis, TemplateIssue,
    TemplateValidation,
};

use chrono::{DateTime, Datelike, Local, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigError, ConfigStore};
use crate::notify::{ChangeNotifier, SubscriptionId};

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Prompt template '{phase}' not found")]
    TemplateNotFound { phase: String },
    #[error("Invalid template: {}", .issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidTemplate { issues: Vec<TemplateIssue> },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    TemplateChanged { phase: String },
    ProviderRegistered { key: String },
    ProviderRemoved { key: String },
    TemplatesReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTemplate {
    pub phase: String,
    pub template: String,
    pub description: String,
    pub variables: Vec<String>,
    pub created: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStats {
    pub length: usize,
    pub word_count: usize,
    pub variables: usize,
    pub is_valid: bool,
}

pub struct PromptEngine {
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
    providers: RwLock<BTreeMap<String, ContextProvider>>,
    defaults: RwLock<Map<String, Value>>,
    events: ChangeNotifier<PromptEvent>,
}

impl PromptEngine {
    pub fn new(config: Arc<ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            providers: RwLock::new(BTreeMap::new()),
            defaults: RwLock::new(Map::new()),
            events: ChangeNotifier::new(),
        }
    }

    /// Registers `timestamp`, `year` and `santaTime`, all read from `clock`.
    pub fn with_default_providers(config: Arc<ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        let engine = Self::new(config, Arc::clone(&clock));

        let c = Arc::clone(&clock);
        engine.register_context_provider(
            "timestamp",
            ContextProvider::dynamic(move || {
                Ok(Value::String(c.now().to_rfc3339_opts(SecondsFormat::Millis, false)))
            }),
        );
        let c = Arc::clone(&clock);
        engine.register_context_provider("year", ContextProvider::dynamic(move || Ok(Value::from(c.now().year()))));
        let c = clock;
        engine.register_context_provider(
            "santaTime",
            ContextProvider::dynamic(move || Ok(serde_json::to_value(santa_time_context(c.now()))?)),
        );
        engine
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PromptEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /* ---------- CONTEXT ---------- */

    /// Replaces any provider already registered under `key`.
    pub fn register_context_provider(&self, key: &str, provider: ContextProvider) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), provider);
        debug!(key = key, "Registered context provider");
        self.events.notify(&PromptEvent::ProviderRegistered { key: key.to_string() });
    }

    pub fn remove_context_provider(&self, key: &str) -> bool {
        let removed = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            debug!(key = key, "Removed context provider");
            self.events.notify(&PromptEvent::ProviderRemoved { key: key.to_string() });
        }
        removed
    }

    /// Shallow-merges `context` into the engine defaults.
    pub fn set_default_context(&self, context: Map<String, Value>) {
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(context);
    }

    /// Defaults, then providers, then `caller`; later layers win per key.
    /// A provider that fails is skipped.
    pub fn build_context(&self, caller: &Map<String, Value>) -> Map<String, Value> {
        let mut context = self.defaults.read().unwrap_or_else(PoisonError::into_inner).clone();

        let providers: Vec<(String, ContextProvider)> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect();
        for (key, provider) in providers {
            match provider.evaluate() {
                Ok(value) => {
                    context.insert(key, value);
                }
                Err(e) => warn!(key = %key, error = %e, "Context provider failed"),
            }
        }

        context.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
        context
    }

    /* ---------- RENDERING ---------- */

    pub fn try_generate_prompt(&self, phase: &str, caller: &Map<String, Value>) -> Result<String, PromptError> {
        let template = self
            .config
            .get_prompt(phase)?
            .ok_or_else(|| PromptError::TemplateNotFound { phase: phase.to_string() })?;

        let rendered = interpolate(&template, &self.build_context(caller));
        for variable in &rendered.unresolved {
            warn!(phase = phase, variable = %variable, "Context variable not found, keeping placeholder");
        }
        debug!(phase = phase, "Generated prompt");
        Ok(rendered.text)
    }

    /// Always returns something displayable.
    pub fn generate_prompt(&self, phase: &str, caller: &Map<String, Value>) -> String {
        match self.try_generate_prompt(phase, caller) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(phase = phase, error = %e, "Prompt generation failed; using fallback");
                defaults::fallback_message(phase).to_string()
            }
        }
    }

    pub fn get_santa_time_context(&self) -> SantaTimeContext {
        santa_time_context(self.clock.now())
    }

    pub fn build_santa_context(&self, stats: Option<&LiveStats>, location: Option<&UserLocation>) -> Map<String, Value> {
        santa_message_context(&self.get_santa_time_context(), stats, location)
    }

    /// Renders the template for the current phase with tracker context.
    pub fn generate_santa_message(&self, stats: Option<&LiveStats>, location: Option<&UserLocation>) -> String {
        let time = self.get_santa_time_context();
        let context = santa_message_context(&time, stats, location);
        self.generate_prompt(time.phase.as_str(), &context)
    }

    pub fn preview_prompt(&self, phase: &str, sample: &Map<String, Value>) -> String {
        let mut context: Map<String, Value> = defaults::PREVIEW_SAMPLE
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        context.extend(sample.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.generate_prompt(phase, &context)
    }

    /* ---------- TEMPLATES ---------- */

    pub fn get_template(&self, phase: &str) -> Result<Option<String>, PromptError> {
        Ok(self.config.get_prompt(phase)?)
    }

    pub fn set_template(&self, phase: &str, template: &str) -> Result<(), PromptError> {
        self.config.set_prompt(phase, template)?;
        self.events.notify(&PromptEvent::TemplateChanged { phase: phase.to_string() });
        Ok(())
    }

    pub fn validate_template(&self, template: &str) -> TemplateValidation {
        validate_template(template)
    }

    pub fn extract_variables(&self, template: &str) -> Vec<String> {
        extract_variables(template)
    }

    pub fn analyze_template(&self, phase: &str) -> Result<TemplateAnalysis, PromptError> {
        let template = self
            .get_template(phase)?
            .ok_or_else(|| PromptError::TemplateNotFound { phase: phase.to_string() })?;
        Ok(analyze(phase, &template))
    }

    pub fn get_available_prompt_types(&self) -> Result<Vec<String>, PromptError> {
        Ok(match self.config.get("prompts")? {
            Some(Value::Object(prompts)) => prompts.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    pub fn create_prompt_template(
        &self,
        phase: &str,
        template: &str,
        description: &str,
    ) -> Result<CreatedTemplate, PromptError> {
        let validation = validate_template(template);
        if !validation.is_valid {
            return Err(PromptError::InvalidTemplate {
                issues: validation.errors,
            });
        }

        self.set_template(phase, template)?;
        info!(phase = phase, "Created prompt template");
        Ok(CreatedTemplate {
            phase: phase.to_string(),
            template: template.to_string(),
            description: description.to_string(),
            variables: validation.variables,
            created: self.clock.now(),
        })
    }

    /// Copies `source` to `target`, replacing each `(find, replace)` pair
    /// literally and in order.
    pub fn clone_prompt_template(
        &self,
        source: &str,
        target: &str,
        replacements: &[(&str, &str)],
    ) -> Result<(), PromptError> {
        let mut template = self
            .get_template(source)?
            .ok_or_else(|| PromptError::TemplateNotFound { phase: source.to_string() })?;
        for (find, replace) in replacements.iter().filter(|(find, _)| !find.is_empty()) {
            template = template.replace(find, replace);
        }

        self.set_template(target, &template)?;
        info!(source = source, target = target, "Cloned prompt template");
        Ok(())
    }

    pub fn get_prompt_stats(&self) -> Result<BTreeMap<String, PromptStats>, PromptError> {
        let mut stats = BTreeMap::new();
        for phase in self.get_available_prompt_types()? {
            let Some(template) = self.get_template(&phase)? else {
                continue;
            };
            let analysis = analyze(&phase, &template);
            stats.insert(
                phase,
                PromptStats {
                    length: analysis.length,
                    word_count: analysis.word_count,
                    variables: analysis.variables.len(),
                    is_valid: analysis.is_valid,
                },
            );
        }
        Ok(stats)
    }

    pub fn reset_to_defaults(&self) -> Result<(), PromptError> {
        for (phase, template) in defaults::DEFAULT_TEMPLATES {
            self.config.set_prompt(phase, template)?;
        }
        info!("Reset all prompts to defaults");
        self.events.notify(&PromptEvent::TemplatesReset);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
