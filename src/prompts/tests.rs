use super::*;
use crate::clock::ManualClock;
use crate::config::{default_document, MemoryConfigStore};
use chrono::TimeZone;
use serde_json::json;
use std::sync::Mutex;
use tokio_test::assert_ok;

fn ctx(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

async fn engine_at(now: DateTime<Local>) -> (PromptEngine, Arc<ConfigStore>, Arc<ManualClock>) {
    let mut document = default_document();
    document["features"]["configAutoSave"] = json!(false);
    let config = Arc::new(ConfigStore::with_backend(Arc::new(MemoryConfigStore::with_document(document))));
    config.load().await.unwrap();
    let clock = Arc::new(ManualClock::new(now));
    let engine = PromptEngine::with_default_providers(Arc::clone(&config), clock.clone());
    (engine, config, clock)
}

fn december(day: u32, hour: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 12, day, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn renders_stored_template_with_caller_context() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    engine.set_template("greeting", "Hello {{name}}, you have {{count}} gifts").unwrap();

    assert_eq!(
        engine.generate_prompt("greeting", &ctx(json!({ "name": "Alex", "count": 3 }))),
        "Hello Alex, you have 3 gifts"
    );
    assert_eq!(
        engine.generate_prompt("greeting", &ctx(json!({ "name": "Alex" }))),
        "Hello Alex, you have {{count}} gifts"
    );
}

#[tokio::test]
async fn missing_template_falls_back() {
    let (engine, _, _) = engine_at(december(1, 9)).await;

    assert!(matches!(
        engine.try_generate_prompt("party", &Map::new()),
        Err(PromptError::TemplateNotFound { .. })
    ));
    assert_eq!(engine.generate_prompt("party", &Map::new()), defaults::GENERIC_FALLBACK);
    assert!(engine.generate_prompt("a.b", &Map::new()).starts_with("Ho ho ho!"));
}

#[tokio::test]
async fn context_layers_in_precedence_order() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    engine.set_default_context(ctx(json!({ "who": "default", "only_default": 1 })));
    engine.register_context_provider("who", ContextProvider::value("provider"));
    engine.register_context_provider("broken", ContextProvider::dynamic(|| anyhow::bail!("sensor offline")));

    let context = engine.build_context(&Map::new());
    assert_eq!(context["who"], "provider");
    assert_eq!(context["only_default"], 1);
    assert!(!context.contains_key("broken"));
    assert_eq!(context["year"], 2025);
    assert_eq!(context["santaTime"]["phase"], "preparing");

    let overridden = engine.build_context(&ctx(json!({ "who": "caller" })));
    assert_eq!(overridden["who"], "caller");

    assert!(engine.remove_context_provider("who"));
    assert!(!engine.remove_context_provider("who"));
    assert_eq!(engine.build_context(&Map::new())["who"], "default");
}

#[tokio::test]
async fn providers_are_evaluated_per_render() {
    let (engine, _, clock) = engine_at(december(1, 9)).await;
    engine.set_template("when", "{{santaTime.phase}} {{year}}").unwrap();

    assert_eq!(engine.generate_prompt("when", &Map::new()), "preparing 2025");
    clock.set(december(24, 20));
    assert_eq!(engine.generate_prompt("when", &Map::new()), "delivering 2025");
}

#[tokio::test]
async fn santa_message_follows_the_clock() {
    let (engine, _, clock) = engine_at(december(24, 19)).await;
    assert_ok!(engine.reset_to_defaults());
    let stats = LiveStats {
        distance: Some(1500.0),
        gifts_delivered: Some(42),
        status: None,
    };

    let message = engine.generate_santa_message(Some(&stats), None);
    assert!(message.contains("delivering presents around the world!"));
    assert!(message.contains("He is about 1,500 km away from the user's location."));
    assert!(message.contains("He has delivered 42 gifts so far!"));

    clock.set(december(25, 7));
    let finished = engine.generate_santa_message(None, None);
    assert!(finished.contains("finishing Christmas deliveries"));
}

#[tokio::test]
async fn delivering_without_stats_blanks_fragments() {
    let (engine, _, _) = engine_at(december(24, 19)).await;
    engine
        .set_template("delivering", "Santa: [{{DISTANCE_CONTEXT}}] [{{GIFTS_CONTEXT}}] at {{USER_LOCATION}}")
        .unwrap();

    assert_eq!(engine.generate_santa_message(None, None), "Santa: [] [] at unknown");
}

#[tokio::test]
async fn preview_uses_sample_values() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    engine.set_template("delivering", "{{SANTA_STATUS}} / {{USER_LOCATION}}").unwrap();

    assert_eq!(engine.preview_prompt("delivering", &Map::new()), "Out for delivery! / 40.75, -73.99");
    assert_eq!(
        engine.preview_prompt("delivering", &ctx(json!({ "SANTA_STATUS": "Resting" }))),
        "Resting / 40.75, -73.99"
    );
}

#[tokio::test]
async fn create_rejects_invalid_templates() {
    let (engine, config, _) = engine_at(december(1, 9)).await;

    let err = engine.create_prompt_template("party", "Hi {{1bad}}", "").unwrap_err();
    assert!(matches!(err, PromptError::InvalidTemplate { .. }));
    assert_eq!(err.to_string(), "Invalid template: Invalid variable name: 1bad");
    assert_eq!(config.get_prompt("party").unwrap(), None);

    let created = engine.create_prompt_template("party", "Cocoa for {{name}}", "after delivery").unwrap();
    assert_eq!(created.variables, vec!["name"]);
    assert_eq!(created.created, december(1, 9));
    assert_eq!(config.get_prompt("party").unwrap().as_deref(), Some("Cocoa for {{name}}"));
}

#[tokio::test]
async fn clone_applies_literal_replacements() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    engine.set_template("preparing", "Elves (and reindeer) wrap. Elves rest.").unwrap();

    engine
        .clone_prompt_template("preparing", "resting", &[("Elves", "Gnomes"), ("(and reindeer)", "")])
        .unwrap();

    assert_eq!(engine.get_template("resting").unwrap().as_deref(), Some("Gnomes  wrap. Gnomes rest."));
    assert!(matches!(
        engine.clone_prompt_template("ghost", "x", &[]),
        Err(PromptError::TemplateNotFound { .. })
    ));
}

#[tokio::test]
async fn analysis_stats_and_types() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    engine.reset_to_defaults().unwrap();

    let mut types = engine.get_available_prompt_types().unwrap();
    types.sort();
    assert_eq!(types, vec!["delivering", "finished", "preparing"]);

    let analysis = engine.analyze_template("delivering").unwrap();
    assert_eq!(analysis.variables, vec!["DISTANCE_CONTEXT", "GIFTS_CONTEXT"]);
    assert!(analysis.is_valid);

    let stats = engine.get_prompt_stats().unwrap();
    assert_eq!(stats["delivering"].variables, 2);
    assert_eq!(stats["preparing"].variables, 0);
    assert!(matches!(
        engine.analyze_template("party"),
        Err(PromptError::TemplateNotFound { .. })
    ));
}

#[tokio::test]
async fn template_edits_are_published() {
    let (engine, _, _) = engine_at(december(1, 9)).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    engine.set_template("preparing", "x").unwrap();
    engine.reset_to_defaults().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            PromptEvent::TemplateChanged {
                phase: "preparing".into()
            },
            PromptEvent::TemplatesReset
        ]
    );
}
