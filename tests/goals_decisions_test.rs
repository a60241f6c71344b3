// tests/goals_decisions_test.rs
//
// Goal store transitions and the append-only decision log.

use std::collections::BTreeMap;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use tessera::decisions::{DecisionOutcome, DecisionStore, RecordDecisionInput};
use tessera::error::EngineError;
use tessera::goals::{CreateGoalInput, GoalStatus, GoalStore, UpdateGoalInput};
use tessera::storage;

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("create in-memory sqlite pool");
    storage::run_migrations(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn test_goal_create_list_update() {
    let store = GoalStore::new(setup_pool().await);

    let goal = store
        .create(CreateGoalInput {
            entity_id: "entity-1".into(),
            name: "break 80 by fall".into(),
            description: Some("stretch target".into()),
            priority_adjustments: BTreeMap::from([("practice_history".into(), 15.0)]),
            target_date: None,
        })
        .await
        .unwrap();
    assert_eq!(goal.status, GoalStatus::Active);
    assert_eq!(goal.progress, 0.0);

    let listed = store.list_by_entity("entity-1", false).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].priority_adjustments["practice_history"], 15.0);

    let updated = store
        .update(UpdateGoalInput {
            goal_id: goal.id.clone(),
            progress: Some(0.4),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.progress, 0.4);

    // progress is clamped to [0, 1]
    let clamped = store
        .update(UpdateGoalInput {
            goal_id: goal.id.clone(),
            progress: Some(1.7),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(clamped.progress, 1.0);
}

#[tokio::test]
async fn test_goal_status_lifecycle() {
    let store = GoalStore::new(setup_pool().await);
    let goal = store
        .create(CreateGoalInput {
            entity_id: "entity-1".into(),
            name: "steady tempo".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    // active -> paused -> active -> completed all legal
    for status in [GoalStatus::Paused, GoalStatus::Active, GoalStatus::Completed] {
        let updated = store
            .update(UpdateGoalInput {
                goal_id: goal.id.clone(),
                status: Some(status),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.status, status);
    }

    // completed is terminal
    let err = store
        .update(UpdateGoalInput {
            goal_id: goal.id.clone(),
            status: Some(GoalStatus::Active),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    // terminal goals drop out of the default listing but are never deleted
    let live = store.list_by_entity("entity-1", false).await.unwrap();
    assert!(live.is_empty());
    let all = store.list_by_entity("entity-1", true).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_active_filter_for_scoring() {
    let store = GoalStore::new(setup_pool().await);
    let active = store
        .create(CreateGoalInput {
            entity_id: "entity-1".into(),
            name: "active".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let paused = store
        .create(CreateGoalInput {
            entity_id: "entity-1".into(),
            name: "paused".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .update(UpdateGoalInput {
            goal_id: paused.id.clone(),
            status: Some(GoalStatus::Paused),
            ..Default::default()
        })
        .await
        .unwrap();

    let scoring_set = store.active_for_entity("entity-1").await.unwrap();
    assert_eq!(scoring_set.len(), 1);
    assert_eq!(scoring_set[0].id, active.id);
}

#[tokio::test]
async fn test_decision_record_and_single_outcome() {
    let store = DecisionStore::new(setup_pool().await);

    let record = store
        .record(RecordDecisionInput {
            entity_id: "entity-1".into(),
            mode: "realtime".into(),
            manifest_summary: serde_json::json!({"blocks_included": 3}),
            memories_used: vec!["mem-1".into()],
            active_goals: vec!["goal-1".into()],
            recommendation: "shift practice toward wedges".into(),
        })
        .await
        .unwrap();
    assert!(record.outcome.is_none());

    let attached = store
        .attach_outcome(
            &record.id,
            DecisionOutcome {
                followed: true,
                result: BTreeMap::from([("scoring_average".into(), -1.8)]),
                feedback: Some("felt right".into()),
                feedback_score: Some(0.9),
            },
        )
        .await
        .unwrap();
    assert!(attached.outcome.as_ref().unwrap().followed);

    // outcome attachment is allowed exactly once
    let err = store
        .attach_outcome(&record.id, DecisionOutcome::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    // and the stored row kept the first outcome
    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.outcome.unwrap().feedback.as_deref(), Some("felt right"));
}

#[tokio::test]
async fn test_decision_listing_newest_first() {
    let store = DecisionStore::new(setup_pool().await);
    for n in 0..3 {
        store
            .record(RecordDecisionInput {
                entity_id: "entity-1".into(),
                mode: "realtime".into(),
                manifest_summary: serde_json::json!({ "n": n }),
                memories_used: vec![],
                active_goals: vec![],
                recommendation: format!("rec {n}"),
            })
            .await
            .unwrap();
    }

    let listed = store.list_by_entity("entity-1", 2).await.unwrap();
    assert_eq!(listed.len(), 2);
}
