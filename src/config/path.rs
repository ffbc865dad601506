//! Dot-path addressing over a JSON document (`aiProvider.defaultModel`,
//! `aiProvider.availableModels.0.name`).

use serde_json::{Map, Value};

use super::errors::ConfigError;

fn segments(path: &str) -> Result<Vec<&str>, ConfigError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidPath(format!("'{}'", path)));
    }
    Ok(parts)
}

/// Resolves `path` against `root`. Any absent segment yields `None`.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating (or overwriting non-container) parents
/// with empty objects. Array elements are addressed by in-range index only.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| ConfigError::InvalidPath("empty path".to_string()))?;

    let mut target = root;
    for key in parents {
        target = child_mut(target, key, path)?;
    }

    match target {
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| ConfigError::InvalidPath(format!("index '{}' out of range in '{}'", last, path)))?;
            *slot = value;
        }
        other => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert((*last).to_string(), value);
            }
        }
    }
    Ok(())
}

fn child_mut<'a>(node: &'a mut Value, key: &str, path: &str) -> Result<&'a mut Value, ConfigError> {
    if !(node.is_object() || node.is_array()) {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i))
            .ok_or_else(|| ConfigError::InvalidPath(format!("index '{}' out of range in '{}'", key, path))),
        Value::Object(map) => {
            let child = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !(child.is_object() || child.is_array()) {
                *child = Value::Object(Map::new());
            }
            Ok(child)
        }
        _ => Err(ConfigError::InvalidPath(format!("cannot descend into '{}'", path))),
    }
}
