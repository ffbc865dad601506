//! Process settings from the environment (and `.env`, if present).
//!
//! | Variable                   | Default                   |
//! |----------------------------|---------------------------|
//! | `SANTA_CONFIG_URL`         | unset                     |
//! | `SANTA_CONFIG_PATH`        | `config/santa-config.json`|
//! | `SANTA_PROBE_TIMEOUT_SECS` | `10`                      |
//! | `SANTA_DISCOVERY_TTL_SECS` | `300`                     |
//! | `RUST_LOG`                 | `info`                    |

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, ConfigSink, ConfigSource, ConfigStore, FileConfigStore, HttpConfigEndpoint};
use crate::models::RegistrySettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/santa-config.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid {var}: '{value}' is not a whole number of seconds")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("Invalid {var}: must be greater than zero")]
    Zero { var: &'static str },
}

/// Where the configuration document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    Remote(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config: ConfigLocation,
    pub probe_timeout: Duration,
    pub discovery_ttl: Duration,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        let registry = RegistrySettings::default();
        Self {
            config: ConfigLocation::File(PathBuf::from(DEFAULT_CONFIG_PATH)),
            probe_timeout: registry.probe_timeout,
            discovery_ttl: registry.cache_ttl,
            log_filter: "info".to_string(),
        }
    }
}

fn seconds(var: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, SettingsError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidSeconds { var, value: raw.clone() })?;
    if secs == 0 {
        return Err(SettingsError::Zero { var });
    }
    Ok(Duration::from_secs(secs))
}

impl Settings {
    /// Loads `.env` (missing file is fine) and reads the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = match (non_empty("SANTA_CONFIG_URL"), non_empty("SANTA_CONFIG_PATH")) {
            (Some(url), _) => ConfigLocation::Remote(url),
            (None, Some(path)) => ConfigLocation::File(PathBuf::from(path)),
            (None, None) => defaults.config,
        };

        Ok(Self {
            config,
            probe_timeout: seconds(
                "SANTA_PROBE_TIMEOUT_SECS",
                non_empty("SANTA_PROBE_TIMEOUT_SECS"),
                defaults.probe_timeout,
            )?,
            discovery_ttl: seconds(
                "SANTA_DISCOVERY_TTL_SECS",
                non_empty("SANTA_DISCOVERY_TTL_SECS"),
                defaults.discovery_ttl,
            )?,
            log_filter: non_empty("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }

    pub fn registry(&self) -> RegistrySettings {
        RegistrySettings {
            cache_ttl: self.discovery_ttl,
            probe_timeout: self.probe_timeout,
        }
    }

    /// Builds the store for [`Settings::config`]. Nothing is fetched yet.
    pub fn config_store(&self) -> Result<ConfigStore, ConfigError> {
        Ok(match &self.config {
            ConfigLocation::Remote(url) => {
                let endpoint = Arc::new(HttpConfigEndpoint::new(url)?);
                let source: Arc<dyn ConfigSource> = endpoint.clone();
                let sink: Arc<dyn ConfigSink> = endpoint;
                ConfigStore::new(source, sink)
            }
            ConfigLocation::File(path) => ConfigStore::with_backend(Arc::new(FileConfigStore::new(path))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.registry(), RegistrySettings::default());
    }

    #[test]
    fn url_wins_over_path() {
        let settings = Settings::from_lookup(lookup(&[
            ("SANTA_CONFIG_URL", "http://localhost:8000"),
            ("SANTA_CONFIG_PATH", "/etc/santa.toml"),
            ("SANTA_DISCOVERY_TTL_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(settings.config, ConfigLocation::Remote("http://localhost:8000".into()));
        assert_eq!(settings.discovery_ttl, Duration::from_secs(60));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert_eq!(
            Settings::from_lookup(lookup(&[("SANTA_PROBE_TIMEOUT_SECS", "soon")])).unwrap_err(),
            SettingsError::InvalidSeconds {
                var: "SANTA_PROBE_TIMEOUT_SECS",
                value: "soon".into()
            }
        );
        assert!(matches!(
            Settings::from_lookup(lookup(&[("SANTA_DISCOVERY_TTL_SECS", "0")])),
            Err(SettingsError::Zero { .. })
        ));
    }
}
