use super::*;
use crate::clock::ManualClock;
use crate::config::{default_document, MemoryConfigStore};
use chrono::TimeZone;
use serde_json::json;
use tokio_test::assert_ok;

struct Harness {
    config: Arc<ConfigStore>,
    backend: Arc<MockBackend>,
    clock: Arc<ManualClock>,
    registry: ModelRegistry,
}

async fn harness(features: Value, backend: MockBackend) -> Harness {
    let mut document = default_document();
    document["features"] = features;
    let config = Arc::new(ConfigStore::with_backend(Arc::new(MemoryConfigStore::with_document(document))));
    config.load().await.unwrap();

    let backend = Arc::new(backend);
    let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap()));
    let registry = ModelRegistry::new(
        Arc::clone(&config),
        backend.clone(),
        clock.clone(),
        RegistrySettings {
            cache_ttl: Duration::from_secs(300),
            probe_timeout: Duration::from_millis(200),
        },
    );
    Harness {
        config,
        backend,
        clock,
        registry,
    }
}

fn discovering() -> Value {
    json!({ "modelValidation": true, "autoDiscoverModels": true, "configAutoSave": false })
}

fn offline_features() -> Value {
    json!({ "modelValidation": false, "autoDiscoverModels": false, "configAutoSave": false })
}

#[test]
fn merge_updates_configured_and_appends_discovered() {
    let mut stated = ModelDescriptor::new("mistral");
    stated.available = Some(true);
    let configured = vec![ModelDescriptor::new("llama3.2"), stated, ModelDescriptor::new("phi")];

    let discovered: Vec<ModelDescriptor> = ["llama3.2:latest", "llama3.2:1b", "gemma:2b"]
        .iter()
        .map(|n| {
            describe_remote(&RemoteModel {
                name: n.to_string(),
                size: Some(1024),
                modified_at: None,
            })
        })
        .collect();

    let merged = merge_models(configured, &discovered);
    let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();

    assert_eq!(names, vec!["llama3.2", "mistral", "phi", "gemma"]);
    assert_eq!(merged[0].available, Some(true));
    assert_eq!(merged[0].size, Some(1024));
    assert_eq!(merged[1].available, Some(true));
    assert_eq!(merged[2].available, Some(false));
    assert!(merged[3].is_auto_discovered());
    assert!(!merged[0].is_auto_discovered());
}

#[tokio::test]
async fn discovery_disabled_returns_configured_only() {
    let h = harness(offline_features(), MockBackend::with_models(&["mistral:latest"])).await;

    let models = h.registry.get_all_models().await.unwrap();

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "llama3.2");
    assert_eq!(models[0].available, Some(false));
    assert_eq!(h.backend.calls("list_models"), 0);
}

#[tokio::test]
async fn discovered_models_are_described() {
    let h = harness(discovering(), MockBackend::with_models(&["llama3.2:latest", "codellama:7b"])).await;

    let discovered = h.registry.discover_models().await;

    assert_eq!(discovered[1].name, "codellama");
    assert_eq!(discovered[1].display_name, "Code Llama");
    assert_eq!(discovered[1].description, "Ollama model (2.0 GB)");
    assert_eq!(discovered[1].parameters["top_k"], Number::from(40));
    assert!(h.registry.cache_snapshot().last_discovered_at.is_some());
}

#[tokio::test]
async fn discovery_cache_respects_ttl() {
    let h = harness(discovering(), MockBackend::with_models(&["mistral"])).await;

    h.registry.get_all_models().await.unwrap();
    h.registry.get_all_models().await.unwrap();
    assert_eq!(h.backend.calls("list_models"), 1);

    h.clock.advance(chrono::Duration::minutes(6));
    let models = h.registry.get_all_models().await.unwrap();
    assert_eq!(h.backend.calls("list_models"), 2);
    assert_eq!(models.len(), 2);

    h.registry.clear_cache();
    h.registry.get_all_models().await.unwrap();
    assert_eq!(h.backend.calls("list_models"), 3);
}

#[tokio::test]
async fn failed_discovery_is_soft_and_leaves_cache_alone() {
    let backend = MockBackend::new();
    backend.fail_discovery();
    let h = harness(discovering(), backend).await;

    let models = h.registry.get_all_models().await.unwrap();

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].available, Some(false));
    assert_eq!(h.registry.cache_snapshot(), DiscoveryCache::default());
    assert!(matches!(
        h.registry.try_discover_models().await,
        Err(RegistryError::Backend(BackendError::Transport(_)))
    ));
}

#[tokio::test]
async fn switch_to_unresponsive_model_is_rejected() {
    let h = harness(discovering(), MockBackend::new()).await;
    h.config.add_model(ModelDescriptor::new("ghost")).unwrap();

    let err = h.registry.switch_model("ghost").await.unwrap_err();

    assert!(matches!(err, RegistryError::ModelUnavailable { ref name } if name == "ghost"));
    assert_eq!(h.registry.get_current_model().unwrap().unwrap().name, "llama3.2");
}

#[tokio::test]
async fn switch_to_responsive_model_notifies() {
    let h = harness(discovering(), MockBackend::with_models(&["mistral"])).await;
    h.config.add_model(ModelDescriptor::new("mistral")).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.registry.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    assert_ok!(h.registry.switch_model("mistral").await);

    assert_eq!(h.config.get("aiProvider.defaultModel").unwrap(), Some(json!("mistral")));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ModelEvent::Switched {
            from: Some("llama3.2".into()),
            to: "mistral".into()
        }]
    );
}

#[tokio::test]
async fn switch_without_validation_checks_configuration() {
    let h = harness(offline_features(), MockBackend::new()).await;

    let err = h.registry.switch_model("unknown").await.unwrap_err();

    assert!(matches!(err, RegistryError::ModelNotFound { .. }));
    assert_eq!(h.backend.calls("generate"), 0);
}

#[tokio::test]
async fn slow_probe_times_out_as_unavailable() {
    let backend = MockBackend::with_models(&["llama3.2"]);
    backend.set_delay(Some(Duration::from_secs(2)));
    let h = harness(discovering(), backend).await;

    assert!(!h.registry.validate_model("llama3.2").await);
}

#[tokio::test]
async fn parameters_are_shallow_merged() {
    let h = harness(offline_features(), MockBackend::new()).await;
    let update: ModelParameters = [("temperature".to_string(), Number::from(1)), ("top_k".to_string(), Number::from(20))]
        .into_iter()
        .collect();

    h.registry.update_model_parameters("llama3.2", update).unwrap();

    assert_eq!(
        h.config.get("aiProvider.availableModels.0.parameters").unwrap(),
        Some(json!({ "temperature": 1, "num_predict": 150, "top_k": 20 }))
    );
    assert!(matches!(
        h.registry.update_model_parameters("ghost", ModelParameters::new()),
        Err(RegistryError::ModelNotFound { .. })
    ));
}

#[tokio::test]
async fn pull_then_delete_round_trip() {
    let h = harness(offline_features(), MockBackend::new()).await;

    h.registry.pull_model("mistral:7b").await.unwrap();
    let pulled = h.config.available_models().unwrap();
    assert_eq!(pulled[1].name, "mistral:7b");
    assert_eq!(pulled[1].description, "Ollama model (pulled)");
    assert_eq!(pulled[1].pulled, Some(true));

    h.registry.delete_model("mistral:7b").await.unwrap();
    assert_eq!(h.config.available_models().unwrap().len(), 1);
    assert_eq!(h.backend.calls("delete"), 1);
}

#[tokio::test]
async fn pulled_tagged_model_can_be_switched_to() {
    let backend = MockBackend::with_models(&["llama3.2"]);
    let mut tuned = ModelDescriptor::new("mistral");
    tuned.display_name = "My Mistral".to_string();
    tuned.parameters = [("top_k".to_string(), serde_json::Number::from(7))].into_iter().collect();
    let h = harness(discovering(), backend).await;
    h.config.add_model(tuned.clone()).unwrap();

    h.registry.pull_model("mistral:7b-instruct").await.unwrap();
    h.registry.switch_model("mistral:7b-instruct").await.unwrap();

    assert_eq!(
        h.config.get_current_model().unwrap().map(|m| m.name).as_deref(),
        Some("mistral:7b-instruct")
    );
    let untouched = h
        .config
        .available_models()
        .unwrap()
        .into_iter()
        .find(|m| m.name == "mistral")
        .unwrap();
    assert_eq!(untouched.display_name, "My Mistral");
    assert_eq!(untouched.parameters, tuned.parameters);
}

#[tokio::test]
async fn delete_of_default_never_reaches_backend() {
    let h = harness(offline_features(), MockBackend::new()).await;

    let err = h.registry.delete_model("llama3.2").await.unwrap_err();

    assert!(matches!(err, RegistryError::CannotRemoveDefault { .. }));
    assert_eq!(h.backend.calls("delete"), 0);
}

#[tokio::test]
async fn failed_pull_leaves_configuration_untouched() {
    let backend = MockBackend::new();
    backend.fail_mutations(true);
    let h = harness(offline_features(), backend).await;

    let err = h.registry.pull_model("nope").await.unwrap_err();

    assert!(matches!(err, RegistryError::Backend(BackendError::Remote(_))));
    assert_eq!(h.config.available_models().unwrap().len(), 1);
}

#[tokio::test]
async fn ollama_status_variants() {
    let h = harness(offline_features(), MockBackend::new()).await;
    let url = "http://localhost:11434".to_string();

    assert_eq!(
        h.registry.get_ollama_status().await,
        OllamaStatus::Running {
            version: "0.1.0-mock".into(),
            url: url.clone()
        }
    );

    h.backend.set_version(VersionReply::Status(500));
    assert_eq!(
        h.registry.get_ollama_status().await,
        OllamaStatus::Error {
            error: "HTTP 500".into(),
            url: url.clone()
        }
    );

    h.backend.set_version(VersionReply::Offline);
    let status = h.registry.get_ollama_status().await;
    assert!(matches!(status, OllamaStatus::Offline { url: ref u, .. } if *u == url));
    assert!(!status.is_running());
}

#[tokio::test]
async fn health_and_stats_reflect_discovery() {
    let h = harness(discovering(), MockBackend::with_models(&["llama3.2:latest", "phi"])).await;

    let health = h.registry.get_model_health().await.unwrap();
    assert_eq!(health.len(), 2);
    assert!(health[0].is_current && health[0].healthy && health[0].available);
    assert!(health[1].auto_discovered);

    // Stats count the configured list only; discovery is not written back.
    let stats = h.registry.get_model_stats().unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.available, 0);
    assert_eq!(stats.unavailable, 1);
    assert_eq!(stats.configured, 1);
    assert_eq!(stats.auto_discovered, 0);
    assert_eq!(stats.current.as_deref(), Some("llama3.2"));
    assert_eq!(stats.cache_age_secs, Some(0));
}
