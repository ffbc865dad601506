//! `{{dot.path}}` templates: interpolation, validation and analysis.

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

use crate::config::path::get_path;

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("token pattern is valid"))
}

fn empty_token_pattern() -> &'static Regex {
    static EMPTY: OnceLock<Regex> = OnceLock::new();
    EMPTY.get_or_init(|| Regex::new(r"\{\{\s*\}\}").expect("empty token pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    pub text: String,
    /// Variables left in place because the context had no value for them.
    pub unresolved: Vec<String>,
}

/// Substitutes every resolvable token. Strings go in raw, other values as
/// their JSON text; missing or null values keep the literal token.
pub fn interpolate(template: &str, context: &Map<String, Value>) -> Interpolation {
    let root = Value::Object(context.clone());
    let mut unresolved = Vec::new();
    let text = token_pattern()
        .replace_all(template, |caps: &Captures| {
            let variable = caps[1].trim();
            match get_path(&root, variable) {
                Some(Value::Null) | None => {
                    unresolved.push(variable.to_string());
                    caps[0].to_string()
                }
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned();

    Interpolation { text, unresolved }
}

pub fn extract_variables(template: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(template)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TemplateIssue {
    UnbalancedBraces { open: usize, close: usize },
    EmptyVariables { count: usize },
    InvalidVariableName { name: String },
}

impl fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateIssue::UnbalancedBraces { .. } => write!(f, "Unbalanced template braces"),
            TemplateIssue::EmptyVariables { count } => write!(f, "Empty template variables found: {}", count),
            TemplateIssue::InvalidVariableName { name } => write!(f, "Invalid variable name: {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateValidation {
    pub is_valid: bool,
    pub errors: Vec<TemplateIssue>,
    pub variables: Vec<String>,
}

/// Never fails; problems are listed in the result.
pub fn validate_template(template: &str) -> TemplateValidation {
    let mut errors = Vec::new();

    let open = template.matches("{{").count();
    let close = template.matches("}}").count();
    if open != close {
        errors.push(TemplateIssue::UnbalancedBraces { open, close });
    }

    let empty = empty_token_pattern().find_iter(template).count();
    if empty > 0 {
        errors.push(TemplateIssue::EmptyVariables { count: empty });
    }

    let variables = extract_variables(template);
    errors.extend(
        variables
            .iter()
            // Blank tokens are already counted as empty variables.
            .filter(|v| !v.is_empty() && !is_valid_name(v))
            .map(|v| TemplateIssue::InvalidVariableName { name: v.clone() }),
    );

    TemplateValidation {
        is_valid: errors.is_empty(),
        errors,
        variables,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAnalysis {
    pub phase: String,
    pub template: String,
    pub length: usize,
    pub variables: Vec<String>,
    pub is_valid: bool,
    pub errors: Vec<TemplateIssue>,
    pub word_count: usize,
}

pub fn analyze(phase: &str, template: &str) -> TemplateAnalysis {
    let validation = validate_template(template);
    TemplateAnalysis {
        phase: phase.to_string(),
        template: template.to_string(),
        length: template.chars().count(),
        variables: validation.variables,
        is_valid: validation.is_valid,
        errors: validation.errors,
        word_count: template.split_whitespace().count(),
    }
}
