// src/service.rs
//! ContextService: the I/O shell around the pure engine.
//!
//! Exactly three I/O boundaries exist: fetching goals and memories before
//! scoring, persisting the manifest after assembly, and the later decision
//! outcome attachment. The engine computation between them is pure, so a
//! failed manifest write still hands the caller the computed result along
//! with a distinct persistence error to retry storage with.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::decisions::{DecisionStore, RecordDecisionInput};
use crate::engine::Engine;
use crate::engine::manifest::Manifest;
use crate::engine::situation::RawData;
use crate::error::{EngineError, Result};
use crate::goals::GoalStore;
use crate::memory::{LifecycleConfig, MemoryStore};
use crate::storage::ManifestStore;

/// Result of one assembly call through the service.
#[derive(Debug)]
pub struct AssembleOutput {
    pub text: String,
    pub manifest: Manifest,
    /// Row id of the persisted manifest, when persistence succeeded.
    pub manifest_id: Option<i64>,
    /// Set when the manifest write failed after a successful assembly; the
    /// computed text and manifest above are still valid.
    pub persist_error: Option<EngineError>,
    /// Ids of the memories injected into this call.
    pub memory_ids: Vec<String>,
    /// Ids of the active goals that biased scoring.
    pub active_goal_ids: Vec<String>,
}

/// Service owning the engine and the four persistent stores.
pub struct ContextService {
    engine: Arc<Engine>,
    goals: GoalStore,
    memories: MemoryStore,
    manifests: ManifestStore,
    decisions: DecisionStore,
}

impl ContextService {
    pub fn new(engine: Arc<Engine>, pool: SqlitePool, lifecycle: LifecycleConfig) -> Self {
        Self {
            engine,
            goals: GoalStore::new(pool.clone()),
            memories: MemoryStore::new(pool.clone(), lifecycle),
            manifests: ManifestStore::new(pool.clone()),
            decisions: DecisionStore::new(pool),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn goals(&self) -> &GoalStore {
        &self.goals
    }

    pub fn memories(&self) -> &MemoryStore {
        &self.memories
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub fn decisions(&self) -> &DecisionStore {
        &self.decisions
    }

    /// Run one assembly call end to end.
    ///
    /// Fetches active goals and live memories, runs the pure pipeline, then
    /// persists the manifest. A `Situation` or `Configuration` failure
    /// aborts before anything is written; a persistence failure after a
    /// successful assembly is surfaced in the output rather than discarding
    /// the computation.
    pub async fn assemble(
        &self,
        entity_id: &str,
        mode: &str,
        raw: &RawData,
    ) -> Result<AssembleOutput> {
        let goals = self.goals.active_for_entity(entity_id).await?;
        let memories = self.memories.list_by_entity(entity_id, false).await?;

        let active_goal_ids: Vec<String> = goals.iter().map(|g| g.id.clone()).collect();
        let memory_ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();

        let (text, manifest) = self
            .engine
            .assemble(entity_id, mode, raw, &goals, &memories)?;

        if manifest.over_floor_budget {
            warn!(
                entity_id,
                mode,
                used = manifest.budget.used_tokens,
                ceiling = manifest.budget.token_ceiling,
                "always-tier floor exceeded the token ceiling"
            );
        }

        let (manifest_id, persist_error) = match self.manifests.persist(&manifest).await {
            Ok(id) => (Some(id), None),
            Err(err) => {
                warn!(entity_id, mode, "manifest persistence failed: {err}");
                (None, Some(err))
            }
        };

        info!(
            entity_id,
            mode,
            included = manifest.budget.blocks_included,
            excluded = manifest.budget.blocks_excluded,
            used_tokens = manifest.budget.used_tokens,
            "assembled context"
        );

        Ok(AssembleOutput {
            text,
            manifest,
            manifest_id,
            persist_error,
            memory_ids,
            active_goal_ids,
        })
    }

    /// Record a decision for a just-assembled manifest.
    pub async fn record_decision(
        &self,
        output: &AssembleOutput,
        recommendation: impl Into<String>,
    ) -> Result<String> {
        let record = self
            .decisions
            .record(RecordDecisionInput {
                entity_id: output.manifest.entity_id.clone(),
                mode: output.manifest.mode.clone(),
                manifest_summary: output.manifest.summary(),
                memories_used: output.memory_ids.clone(),
                active_goals: output.active_goal_ids.clone(),
                recommendation: recommendation.into(),
            })
            .await?;
        Ok(record.id)
    }
}
