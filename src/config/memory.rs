//! In-process config source/sink for offline runs and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::errors::ConfigError;
use super::source::{ConfigSink, ConfigSource};

const ORIGIN: &str = "memory://santa-config";

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    document: Mutex<Option<Value>>,
    saved: Mutex<Vec<Value>>,
    fetches: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryConfigStore {
    /// A source that serves `document` on every fetch.
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    /// A source whose fetch always fails as if the server were down.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set_document(&self, document: Option<Value>) {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = document;
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every document persisted so far, oldest first.
    pub fn saved(&self) -> Vec<Value> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigStore {
    fn describe(&self) -> String {
        ORIGIN.to_string()
    }

    async fn fetch(&self) -> Result<Value, ConfigError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ConfigError::Transport {
                url: ORIGIN.to_string(),
                reason: "unable to connect".to_string(),
            })
    }
}

#[async_trait]
impl ConfigSink for MemoryConfigStore {
    async fn persist(&self, document: &Value) -> Result<(), ConfigError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ConfigError::Http {
                url: ORIGIN.to_string(),
                status: 503,
            });
        }
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(document.clone());
        Ok(())
    }
}
