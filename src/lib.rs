//! Configuration, model orchestration and prompt templating for the Santa
//! Tracker.
//!
//! Build the three components explicitly and hand them to whatever needs
//! them; [`commands::AppState`] does the usual wiring.

pub mod clock;
pub mod commands;
pub mod config;
pub mod models;
pub mod notify;
pub mod prompts;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::AppState;
pub use config::{ConfigError, ConfigEvent, ConfigStore, ConfigValidationError, ModelDescriptor};
pub use models::{BackendError, ModelBackend, ModelEvent, ModelRegistry, OllamaStatus, RegistryError};
pub use notify::{ChangeNotifier, SubscriptionId};
pub use prompts::{LiveStats, Phase, PromptEngine, PromptError, PromptEvent, UserLocation};
pub use settings::{Settings, SettingsError};

use tracing::{info, warn};

/// Loads settings and configuration, then logs what the tracker would show.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(&settings).map_err(anyhow::Error::msg)?;

    match state.load_config().await {
        Ok(summary) => info!(?summary, "Configuration ready"),
        Err(e) => warn!(error = %e, "Running on the built-in default configuration"),
    }

    let status = state.ollama_status().await;
    info!(?status, "Ollama status");

    let models = state.list_models().await.map_err(anyhow::Error::msg)?;
    for model in &models {
        info!(model = %model.name, available = model.is_available(), "Model");
    }

    let time = state.prompts.get_santa_time_context();
    info!(phase = %time.phase, "Santa is {}", time.phase);
    println!("{}", state.santa_message(None, None));
    Ok(())
}
