//! Typed views over the configuration document.
//!
//! The store keeps the canonical document as a `serde_json::Value` so any
//! dot-path can be read or written; these structs are what the rest of the
//! crate deserializes sections into.

use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use std::collections::BTreeMap;

/// Tuning knobs sent to the backend (`temperature`, `num_predict`, `top_p`, `top_k`).
pub type ModelParameters = BTreeMap<String, Number>;

/// Phases every configuration must carry a prompt for.
pub const REQUIRED_PROMPTS: [&str; 3] = ["preparing", "delivering", "finished"];

/// Top-level sections `validate` insists on.
pub const REQUIRED_SECTIONS: [&str; 3] = ["aiProvider", "prompts", "server"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: ModelParameters,
    /// `None` means the document never stated availability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_discovered: Option<bool>,
    /// Bytes on disk as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulled: Option<bool>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: String::new(),
            parameters: ModelParameters::new(),
            available: None,
            auto_discovered: None,
            size: None,
            modified_at: None,
            pulled: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.unwrap_or(false)
    }

    pub fn is_auto_discovered(&self) -> bool {
        self.auto_discovered.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiProvider {
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,
    pub url: String,
    pub default_model: String,
    pub available_models: Vec<ModelDescriptor>,
}

fn default_provider_type() -> String {
    "ollama".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSection {
    pub port: u16,
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Behavior switches under `features`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Features {
    /// Probe a model with a one-token generation before switching to it.
    pub model_validation: bool,
    /// Merge models reported by the backend into `get_all_models`.
    pub auto_discover_models: bool,
    /// Persist the document after every mutation.
    pub config_auto_save: bool,
}

/// Panel switches under `ui`; the core only stores them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct UiOptions {
    pub show_config_panel: bool,
    pub allow_model_switching: bool,
    pub allow_prompt_editing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SantaConfig {
    pub ai_provider: AiProvider,
    pub prompts: BTreeMap<String, String>,
    pub server: ServerSection,
    #[serde(default)]
    pub ui: UiOptions,
    #[serde(default)]
    pub features: Features,
}

/// The embedded fallback document. Always passes validation.
pub fn default_document() -> Value {
    json!({
        "aiProvider": {
            "type": "ollama",
            "url": "http://localhost:11434",
            "defaultModel": "llama3.2",
            "availableModels": [
                {
                    "name": "llama3.2",
                    "displayName": "Llama 3.2",
                    "description": "Default model",
                    "parameters": {
                        "temperature": 0.8,
                        "num_predict": 150
                    }
                }
            ]
        },
        "prompts": {
            "preparing": "You are Santa Claus! Write a cheerful message about preparing for Christmas.",
            "delivering": "You are Santa Claus! Write a cheerful message about delivering presents.",
            "finished": "You are Santa Claus! Write a cheerful message about finishing deliveries."
        },
        "server": {
            "port": 8000,
            "corsEnabled": true
        },
        "ui": {
            "showConfigPanel": true,
            "allowModelSwitching": true,
            "allowPromptEditing": true
        },
        "features": {
            "modelValidation": true,
            "autoDiscoverModels": false,
            "configAutoSave": true
        }
    })
}
