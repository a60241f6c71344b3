// tests/service_test.rs
//
// End-to-end assembly through the service: fetch goals/memories, run the
// pipeline, persist the manifest, and record a decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use tessera::config::EngineConfig;
use tessera::engine::Engine;
use tessera::engine::registry::FnRegistry;
use tessera::engine::situation::RawData;
use tessera::goals::CreateGoalInput;
use tessera::memory::{CreateMemoryInput, LifecycleConfig, MemoryCategory};
use tessera::service::ContextService;
use tessera::storage;

const CONFIG: &str = r#"
    name = "advisor"

    [modes.realtime]
    budget = 1800

    [[blocks]]
    key = "identity"
    tier = "always"
    render = "key_values"

    [[blocks]]
    key = "recent_activity"
    tier = "conditional"
    render = "bullet_list"
    should_include = "non_empty"

    [[rules]]
    name = "crisis"
    condition = { flag = "severity", gte = 8.0 }

    [rules.adjustments]
    recent_activity = 20.0
"#;

async fn setup_service() -> (ContextService, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("create in-memory sqlite pool");
    storage::run_migrations(&pool).await.unwrap();

    let config = EngineConfig::from_toml_str(CONFIG).unwrap();
    let lifecycle = config.lifecycle;
    let engine = Engine::new(config, &FnRegistry::with_builtins()).unwrap();
    let service = ContextService::new(Arc::new(engine), pool.clone(), lifecycle);
    (service, pool)
}

fn raw_checkin() -> RawData {
    let mut raw = RawData::new();
    raw.insert("identity".into(), json!({"name": "Casey", "level": "intermediate"}));
    raw.insert(
        "recent_activity".into(),
        json!(["two sessions this week", "round on Saturday"]),
    );
    raw.insert("severity".into(), json!(9));
    raw
}

#[tokio::test]
async fn test_assemble_persists_manifest() {
    let (service, _pool) = setup_service().await;

    let output = service
        .assemble("entity-1", "realtime", &raw_checkin())
        .await
        .unwrap();

    assert!(output.persist_error.is_none());
    let manifest_id = output.manifest_id.expect("manifest persisted");

    let stored = service
        .manifests()
        .latest("entity-1")
        .await
        .unwrap()
        .expect("latest manifest");
    assert_eq!(stored.id, manifest_id);
    assert_eq!(stored.manifest.assembled_text, output.text);
    assert_eq!(
        serde_json::to_string(&stored.manifest).unwrap(),
        serde_json::to_string(&output.manifest).unwrap()
    );
}

#[tokio::test]
async fn test_assemble_uses_stored_goals_and_memories() {
    let (service, _pool) = setup_service().await;

    let goal = service
        .goals()
        .create(CreateGoalInput {
            entity_id: "entity-1".into(),
            name: "rebuild confidence".into(),
            priority_adjustments: BTreeMap::from([("recent_activity".into(), 5.0)]),
            ..Default::default()
        })
        .await
        .unwrap();
    let memory = service
        .memories()
        .create(CreateMemoryInput {
            entity_id: "entity-1".into(),
            category: MemoryCategory::EmotionalSignature,
            summary: "tightens up after bogeys".into(),
            detail: None,
            tags: vec![],
        })
        .await
        .unwrap();

    let output = service
        .assemble("entity-1", "realtime", &raw_checkin())
        .await
        .unwrap();

    assert_eq!(output.active_goal_ids, vec![goal.id.clone()]);
    assert_eq!(output.memory_ids, vec![memory.id.clone()]);
    assert!(output.text.contains("tightens up after bogeys"));

    let activity = output
        .manifest
        .entries
        .iter()
        .find(|e| e.block_key == "recent_activity")
        .unwrap();
    // base 60 + rule 20 + goal 5
    assert_eq!(activity.score, 85.0);
    assert!(
        activity
            .signals
            .contains(&"goal:rebuild confidence:+5".to_string())
    );
    assert!(activity.signals.contains(&"rule:crisis:+20".to_string()));
}

#[tokio::test]
async fn test_record_decision_snapshot() {
    let (service, _pool) = setup_service().await;

    let memory = service
        .memories()
        .create(CreateMemoryInput {
            entity_id: "entity-1".into(),
            category: MemoryCategory::DomainKnowledge,
            summary: "short game is the priority".into(),
            detail: None,
            tags: vec![],
        })
        .await
        .unwrap();

    let output = service
        .assemble("entity-1", "realtime", &raw_checkin())
        .await
        .unwrap();
    let decision_id = service
        .record_decision(&output, "focus this week's drills on wedges")
        .await
        .unwrap();

    let record = service
        .decisions()
        .get(&decision_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.entity_id, "entity-1");
    assert_eq!(record.memories_used, vec![memory.id]);
    assert_eq!(record.manifest_summary["blocks_included"], json!(3));
}

#[tokio::test]
async fn test_unknown_mode_writes_nothing() {
    let (service, _pool) = setup_service().await;

    let err = service
        .assemble("entity-1", "nonexistent", &raw_checkin())
        .await
        .unwrap_err();
    assert!(err.is_pre_persistence());

    let stored = service.manifests().latest("entity-1").await.unwrap();
    assert!(stored.is_none());
}
