//! Where the configuration document comes from and where it goes.
//!
//! Two backends ship with the crate: the config HTTP server
//! (`GET /api/config`, `POST /api/config/save`) and a local file holding
//! JSON or TOML.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::errors::ConfigError;

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Value, ConfigError>;
}

#[async_trait]
pub trait ConfigSink: Send + Sync {
    /// Persists the full document. Must be idempotent.
    async fn persist(&self, document: &Value) -> Result<(), ConfigError>;
}

/* ---------- HTTP ---------- */

pub struct HttpConfigEndpoint {
    client: Client,
    load_url: String,
    save_url: String,
}

impl HttpConfigEndpoint {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base = url::Url::parse(base_url)
            .map_err(|e| ConfigError::Parse(format!("invalid config server url '{}': {}", base_url, e)))?;
        let join = |p: &str| {
            base.join(p)
                .map(|u| u.to_string())
                .map_err(|e| ConfigError::Parse(format!("invalid config endpoint '{}': {}", p, e)))
        };
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::transport(base_url, e))?;

        Ok(Self {
            client,
            load_url: join("api/config")?,
            save_url: join("api/config/save")?,
        })
    }
}

#[async_trait]
impl ConfigSource for HttpConfigEndpoint {
    fn describe(&self) -> String {
        self.load_url.clone()
    }

    #[instrument(skip(self), fields(url = %self.load_url))]
    async fn fetch(&self) -> Result<Value, ConfigError> {
        let response = self
            .client
            .get(&self.load_url)
            .send()
            .await
            .map_err(|e| ConfigError::transport(&self.load_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Http {
                url: self.load_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConfigError::transport(&self.load_url, e))?;
        debug!(bytes = body.len(), "Fetched configuration");
        serde_json::from_str(&body).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ConfigSink for HttpConfigEndpoint {
    #[instrument(skip(self, document), fields(url = %self.save_url))]
    async fn persist(&self, document: &Value) -> Result<(), ConfigError> {
        let response = self
            .client
            .post(&self.save_url)
            .json(document)
            .send()
            .await
            .map_err(|e| ConfigError::transport(&self.save_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Http {
                url: self.save_url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/* ---------- FILE ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }

    pub fn parse(self, raw: &str) -> Result<Value, ConfigError> {
        match self {
            FileFormat::Json => serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string())),
            FileFormat::Toml => toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    pub fn render(self, document: &Value) -> Result<String, ConfigError> {
        match self {
            FileFormat::Json => {
                serde_json::to_string_pretty(document).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            FileFormat::Toml => {
                // Going through toml::Value puts plain keys ahead of tables.
                let table = toml::Value::try_from(document).map_err(|e| ConfigError::Serialize(e.to_string()))?;
                toml::to_string_pretty(&table).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
        }
    }
}

/// A configuration document on the local filesystem (`.json` or `.toml`).
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    format: FileFormat,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = FileFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ConfigSource for FileConfigStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Value, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        self.format.parse(&raw)
    }
}

#[async_trait]
impl ConfigSink for FileConfigStore {
    async fn persist(&self, document: &Value) -> Result<(), ConfigError> {
        let rendered = self.format.render(document)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| self.io_error(e))?;

        // Each write stages into its own temp file; the rename swaps the
        // document in whole.
        let target = self.path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staged = NamedTempFile::new_in(&dir)?;
            staged.write_all(rendered.as_bytes())?;
            staged.as_file().sync_all()?;
            staged.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| self.io_error(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(|e| self.io_error(e))
    }
}
