// tests/memory_store_test.rs
//
// Memory store integration: lifecycle persistence, the compare-and-set
// mutation discipline, and the decay cycle.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use tessera::error::EngineError;
use tessera::memory::{
    CreateMemoryInput, LifecycleConfig, MemoryCategory, MemoryStage, MemoryStore,
};
use tessera::storage;

/// Helper to set up a clean, isolated in-memory store.
async fn setup_store() -> MemoryStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("create in-memory sqlite pool");
    storage::run_migrations(&pool).await.unwrap();
    MemoryStore::new(pool, LifecycleConfig::default())
}

fn input(entity: &str, summary: &str) -> CreateMemoryInput {
    CreateMemoryInput {
        entity_id: entity.to_string(),
        category: MemoryCategory::BehavioralPattern,
        summary: summary.to_string(),
        detail: None,
        tags: vec!["test".to_string()],
    }
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let store = setup_store().await;
    let created = store.create(input("entity-1", "hesitates on approach")).await.unwrap();

    let loaded = store.get(&created.id).await.unwrap().unwrap();
    assert_eq!(loaded.summary, "hesitates on approach");
    assert_eq!(loaded.stage, MemoryStage::Draft);
    assert_eq!(loaded.confidence, 0.2);
    assert_eq!(loaded.tags, vec!["test".to_string()]);
    assert_eq!(loaded.version, 0);
}

#[tokio::test]
async fn test_list_excludes_terminal_by_default() {
    let store = setup_store().await;
    let keep = store.create(input("entity-1", "keep me")).await.unwrap();
    let gone = store.create(input("entity-1", "revise me")).await.unwrap();
    store.revise(&gone.id, "revised version", "").await.unwrap();

    let live = store.list_by_entity("entity-1", false).await.unwrap();
    let live_ids: Vec<&str> = live.iter().map(|m| m.id.as_str()).collect();
    assert!(live_ids.contains(&keep.id.as_str()));
    assert!(!live_ids.contains(&gone.id.as_str()));
    // the replacement draft is live
    assert_eq!(live.len(), 2);

    let all = store.list_by_entity("entity-1", true).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_reinforce_follows_confidence_curve() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "note")).await.unwrap();

    // 0.2 + 0.8 * 0.15 = 0.32, still a draft
    let once = store.reinforce(&memory.id).await.unwrap();
    assert!((once.confidence - 0.32).abs() < 1e-9);
    assert_eq!(once.stage, MemoryStage::Draft);

    // 0.32 + 0.68 * 0.15 = 0.422, crosses the draft threshold
    let twice = store.reinforce(&memory.id).await.unwrap();
    assert!((twice.confidence - 0.422).abs() < 1e-9);
    assert_eq!(twice.stage, MemoryStage::Reinforced);
    assert_eq!(twice.version, 2);
    assert!(twice.last_reinforced_at.is_some());
}

#[tokio::test]
async fn test_concurrent_reinforcements_both_land() {
    // File-backed database so both tasks share real connections.
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("tessera-test.db").display()
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .unwrap();
    storage::run_migrations(&pool).await.unwrap();
    let store = Arc::new(MemoryStore::new(pool, LifecycleConfig::default()));

    let memory = store.create(input("entity-1", "contended")).await.unwrap();

    let a = {
        let store = store.clone();
        let id = memory.id.clone();
        tokio::spawn(async move { store.reinforce(&id).await })
    };
    let b = {
        let store = store.clone();
        let id = memory.id.clone();
        tokio::spawn(async move { store.reinforce(&id).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Both increments applied sequentially, never one overwriting the other:
    // 0.2 -> 0.32 -> 0.422
    let final_state = store.get(&memory.id).await.unwrap().unwrap();
    assert!((final_state.confidence - 0.422).abs() < 1e-9);
    assert_eq!(final_state.version, 2);
}

#[tokio::test]
async fn test_decay_cycle_steps_and_archives() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "fading")).await.unwrap();

    // 0.2 decays in 0.05 steps; the fourth check bottoms out and archives.
    let no_grace = chrono::Duration::seconds(0);
    for expected in [0.15, 0.10, 0.05] {
        let report = store.run_decay_cycle(no_grace).await.unwrap();
        assert_eq!(report.decayed, 1);
        let current = store.get(&memory.id).await.unwrap().unwrap();
        assert!((current.confidence - expected).abs() < 1e-9);
        assert_eq!(current.stage, MemoryStage::Draft);
    }

    let report = store.run_decay_cycle(no_grace).await.unwrap();
    assert_eq!(report.archived, 1);
    let archived = store.get(&memory.id).await.unwrap().unwrap();
    assert_eq!(archived.stage, MemoryStage::Archived);
    assert_eq!(archived.confidence, 0.0);

    // Terminal memories are skipped on later passes
    let report = store.run_decay_cycle(no_grace).await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn test_recent_reinforcement_grants_decay_grace() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "active")).await.unwrap();
    store.reinforce(&memory.id).await.unwrap();

    let report = store
        .run_decay_cycle(chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.decayed, 0);

    let unchanged = store.get(&memory.id).await.unwrap().unwrap();
    assert!((unchanged.confidence - 0.32).abs() < 1e-9);
}

#[tokio::test]
async fn test_mature_memory_decays_then_revives_to_mature() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "seasoned")).await.unwrap();

    // Reinforce up to maturity
    let mut current = memory.clone();
    while current.stage != MemoryStage::Mature {
        current = store.reinforce(&memory.id).await.unwrap();
    }

    let report = store.run_decay_cycle(chrono::Duration::seconds(0)).await.unwrap();
    assert_eq!(report.decayed, 1);
    let decaying = store.get(&memory.id).await.unwrap().unwrap();
    assert_eq!(decaying.stage, MemoryStage::Decaying);

    let revived = store.reinforce(&memory.id).await.unwrap();
    assert_eq!(revived.stage, MemoryStage::Mature);
}

#[tokio::test]
async fn test_revise_preserves_lineage() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "first reading")).await.unwrap();

    let (old, replacement) = store
        .revise(&memory.id, "second reading", "they changed strategy")
        .await
        .unwrap();

    assert_eq!(old.stage, MemoryStage::Revised);
    assert_eq!(old.superseded_by.as_deref(), Some(replacement.id.as_str()));

    let stored_old = store.get(&memory.id).await.unwrap().unwrap();
    assert_eq!(stored_old.stage, MemoryStage::Revised);

    let stored_new = store.get(&replacement.id).await.unwrap().unwrap();
    assert_eq!(stored_new.stage, MemoryStage::Draft);
    assert_eq!(stored_new.confidence, 0.2);
    assert_eq!(stored_new.detail, "they changed strategy");

    // revised memories are immutable
    let err = store.reinforce(&memory.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    let err = store.revise(&memory.id, "third", "").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_patch_rejected_on_terminal() {
    let store = setup_store().await;
    let memory = store.create(input("entity-1", "sealed")).await.unwrap();
    store.revise(&memory.id, "resealed", "").await.unwrap();

    let err = store
        .patch(tessera::memory::UpdateMemoryInput {
            memory_id: memory.id.clone(),
            summary: Some("tampered".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_missing_memory_is_not_found() {
    let store = setup_store().await;
    let err = store.reinforce("no-such-id").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "memory", .. }));
}
