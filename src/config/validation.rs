use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use super::schema::{Features, ModelDescriptor, ServerSection, UiOptions, REQUIRED_PROMPTS, REQUIRED_SECTIONS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Missing required configuration section: {section}")]
    MissingSection { section: String },
    #[error("Invalid aiProvider configuration: {reason}")]
    InvalidProvider { reason: String },
    #[error("availableModels must be a non-empty array")]
    EmptyModelList,
    #[error("Default model '{name}' not found in available models")]
    DefaultModelNotFound { name: String },
    #[error("Missing required prompt: {phase}")]
    MissingPrompt { phase: String },
    #[error("Invalid '{section}' section: {reason}")]
    InvalidSection { section: String, reason: String },
}

/// Checks every invariant and returns the first violation.
pub fn validate_document(document: &Value) -> Result<(), ConfigValidationError> {
    match collect_violations(document).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Every invariant violation in `document`, in section order.
pub fn collect_violations(document: &Value) -> Vec<ConfigValidationError> {
    let mut violations = Vec::new();

    let Some(root) = document.as_object() else {
        return REQUIRED_SECTIONS
            .iter()
            .map(|s| ConfigValidationError::MissingSection { section: s.to_string() })
            .collect();
    };

    for section in REQUIRED_SECTIONS {
        if !root.get(section).map_or(false, Value::is_object) {
            violations.push(ConfigValidationError::MissingSection {
                section: section.to_string(),
            });
        }
    }

    if let Some(provider) = root.get("aiProvider").filter(|v| v.is_object()) {
        check_provider(provider, &mut violations);
    }
    if let Some(prompts) = root.get("prompts").filter(|v| v.is_object()) {
        check_prompts(prompts, &mut violations);
    }
    if let Some(server) = root.get("server").filter(|v| v.is_object()) {
        check_section::<ServerSection>("server", server, &mut violations);
    }
    if let Some(features) = root.get("features") {
        check_section::<Features>("features", features, &mut violations);
    }
    if let Some(ui) = root.get("ui") {
        check_section::<UiOptions>("ui", ui, &mut violations);
    }

    violations
}

fn invalid_provider(reason: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError::InvalidProvider { reason: reason.into() }
}

fn check_provider(provider: &Value, violations: &mut Vec<ConfigValidationError>) {
    if let Some(kind) = provider.get("type") {
        if !kind.is_string() {
            violations.push(invalid_provider("type must be a string"));
        }
    }

    match provider.get("url").and_then(Value::as_str) {
        None | Some("") => violations.push(invalid_provider("url is required")),
        Some(raw) => {
            if let Err(e) = url::Url::parse(raw) {
                violations.push(invalid_provider(format!("url '{}' is not valid: {}", raw, e)));
            }
        }
    }

    let default_model = match provider.get("defaultModel").and_then(Value::as_str) {
        None | Some("") => {
            violations.push(invalid_provider("defaultModel is required"));
            None
        }
        Some(name) => Some(name),
    };

    let Some(models) = provider.get("availableModels") else {
        violations.push(invalid_provider("availableModels is required"));
        return;
    };
    let Some(models) = models.as_array() else {
        violations.push(invalid_provider("availableModels must be an array"));
        return;
    };
    if models.is_empty() {
        violations.push(ConfigValidationError::EmptyModelList);
        return;
    }

    let mut names = HashSet::new();
    for (index, raw) in models.iter().enumerate() {
        match serde_json::from_value::<ModelDescriptor>(raw.clone()) {
            Ok(model) if model.name.is_empty() => {
                violations.push(invalid_provider(format!("model #{} has an empty name", index)));
            }
            Ok(model) => {
                if !names.insert(model.name.clone()) {
                    violations.push(invalid_provider(format!("duplicate model name '{}'", model.name)));
                }
            }
            Err(e) => violations.push(invalid_provider(format!("model #{}: {}", index, e))),
        }
    }

    if let Some(name) = default_model {
        if !names.contains(name) {
            violations.push(ConfigValidationError::DefaultModelNotFound {
                name: name.to_string(),
            });
        }
    }
}

fn check_prompts(prompts: &Value, violations: &mut Vec<ConfigValidationError>) {
    for phase in REQUIRED_PROMPTS {
        let present = prompts
            .get(phase)
            .and_then(Value::as_str)
            .map_or(false, |p| !p.trim().is_empty());
        if !present {
            violations.push(ConfigValidationError::MissingPrompt {
                phase: phase.to_string(),
            });
        }
    }
}

fn check_section<T: serde::de::DeserializeOwned>(
    section: &str,
    value: &Value,
    violations: &mut Vec<ConfigValidationError>,
) {
    if let Err(e) = serde_json::from_value::<T>(value.clone()) {
        violations.push(ConfigValidationError::InvalidSection {
            section: section.to_string(),
            reason: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_document;
    use serde_json::json;

    #[test]
    fn default_document_is_valid() {
        assert_eq!(validate_document(&default_document()), Ok(()));
    }

    #[test]
    fn missing_sections_are_reported() {
        let violations = collect_violations(&json!({"server": {"port": 8000}}));
        assert!(violations.contains(&ConfigValidationError::MissingSection {
            section: "aiProvider".into()
        }));
        assert!(violations.contains(&ConfigValidationError::MissingSection {
            section: "prompts".into()
        }));
    }

    #[test]
    fn empty_model_list() {
        let mut doc = default_document();
        doc["aiProvider"]["availableModels"] = json!([]);
        assert_eq!(validate_document(&doc), Err(ConfigValidationError::EmptyModelList));
    }

    #[test]
    fn default_model_must_be_listed() {
        let mut doc = default_document();
        doc["aiProvider"]["defaultModel"] = json!("mistral");
        assert_eq!(
            validate_document(&doc),
            Err(ConfigValidationError::DefaultModelNotFound { name: "mistral".into() })
        );
    }

    #[test]
    fn blank_prompt_counts_as_missing() {
        let mut doc = default_document();
        doc["prompts"]["delivering"] = json!("   ");
        assert_eq!(
            validate_document(&doc),
            Err(ConfigValidationError::MissingPrompt { phase: "delivering".into() })
        );
    }

    #[test]
    fn provider_without_url_is_invalid() {
        let mut doc = default_document();
        doc["aiProvider"].as_object_mut().unwrap().remove("url");
        assert!(matches!(
            validate_document(&doc),
            Err(ConfigValidationError::InvalidProvider { .. })
        ));
    }

    #[test]
    fn unknown_feature_flag_is_rejected() {
        let mut doc = default_document();
        doc["features"]["teleportation"] = json!(true);
        assert!(matches!(
            validate_document(&doc),
            Err(ConfigValidationError::InvalidSection { ref section, .. }) if section == "features"
        ));
    }

    #[test]
    fn all_violations_are_collected() {
        let mut doc = default_document();
        doc["aiProvider"]["defaultModel"] = json!("ghost");
        doc["prompts"] = json!({"preparing": "hi"});
        let violations = collect_violations(&doc);
        assert_eq!(violations.len(), 3);
    }
}
