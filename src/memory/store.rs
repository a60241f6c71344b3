// src/memory/store.rs
//! SQLite-backed memory store.
//!
//! Every lifecycle mutation goes through a versioned compare-and-set: read
//! the row, run the pure transition, then update guarded by the version we
//! read. A concurrent writer bumps the version, our update affects zero
//! rows, and we reload and retry, so confidence arithmetic is never lost to a
//! race. Last-writer-wins is deliberately impossible here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::memory::lifecycle::{self, LifecycleConfig};
use crate::memory::temporal::TemporalMetadata;
use crate::memory::types::{Memory, MemoryCategory, MemoryStage};

/// Rows examined per decay pass, to keep write locks short.
const DECAY_BATCH_LIMIT: i64 = 500;

/// Input for creating a memory
#[derive(Debug, Clone)]
pub struct CreateMemoryInput {
    pub entity_id: String,
    pub category: MemoryCategory,
    pub summary: String,
    pub detail: Option<String>,
    pub tags: Vec<String>,
}

/// Input for patching mutable memory fields
#[derive(Debug, Clone, Default)]
pub struct UpdateMemoryInput {
    pub memory_id: String,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Outcome of one decay pass
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DecayCycleReport {
    pub scanned: usize,
    pub decayed: usize,
    pub archived: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
    lifecycle: LifecycleConfig,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool, lifecycle: LifecycleConfig) -> Self {
        Self { pool, lifecycle }
    }

    pub async fn create(&self, input: CreateMemoryInput) -> Result<Memory> {
        let now = Utc::now();
        let mut memory = Memory::new(input.entity_id, input.category, input.summary, now);
        memory.detail = input.detail.unwrap_or_default();
        memory.tags = input.tags;
        self.insert(&memory).await?;
        debug!(memory_id = %memory.id, entity_id = %memory.entity_id, "created memory");
        Ok(memory)
    }

    pub async fn get(&self, memory_id: &str) -> Result<Option<Memory>> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = $1")
            .bind(memory_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_memory(&r)).transpose()
    }

    /// List an entity's memories, oldest first. Terminal (`archived` /
    /// `revised`) memories are excluded unless requested.
    pub async fn list_by_entity(&self, entity_id: &str, include_terminal: bool) -> Result<Vec<Memory>> {
        let sql = if include_terminal {
            "SELECT * FROM memories WHERE entity_id = $1 ORDER BY created_at ASC, id ASC"
        } else {
            "SELECT * FROM memories WHERE entity_id = $1 \
             AND stage NOT IN ('archived', 'revised') ORDER BY created_at ASC, id ASC"
        };
        let rows = sqlx::query(sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_memory).collect()
    }

    /// Patch descriptive fields. Lifecycle state (stage, confidence) is only
    /// reachable through `reinforce`, decay, and `revise`.
    pub async fn patch(&self, input: UpdateMemoryInput) -> Result<Memory> {
        let id = input.memory_id.clone();
        self.mutate(&id, |current| {
            if current.stage.is_terminal() {
                return Err(EngineError::invalid_transition(
                    format!("memory {}", current.id),
                    current.stage.as_str(),
                    "patch",
                ));
            }
            let mut next = current.clone();
            if let Some(summary) = &input.summary {
                next.summary = summary.clone();
            }
            if let Some(detail) = &input.detail {
                next.detail = detail.clone();
            }
            if let Some(tags) = &input.tags {
                next.tags = tags.clone();
            }
            next.updated_at = Utc::now();
            Ok(next)
        })
        .await
    }

    /// Apply one reinforcement under compare-and-set.
    pub async fn reinforce(&self, memory_id: &str) -> Result<Memory> {
        let lifecycle_config = self.lifecycle;
        let memory = self
            .mutate(memory_id, move |current| {
                lifecycle::reinforce(current, &lifecycle_config, Utc::now())
            })
            .await?;
        debug!(
            memory_id,
            confidence = memory.confidence,
            stage = memory.stage.as_str(),
            "reinforced memory"
        );
        Ok(memory)
    }

    /// Replace a memory with a fresh draft, atomically.
    ///
    /// The old row flips to `revised` with `superseded_by` set and the
    /// replacement is inserted in the same transaction.
    pub async fn revise(
        &self,
        memory_id: &str,
        new_summary: &str,
        new_detail: &str,
    ) -> Result<(Memory, Memory)> {
        loop {
            let current = self.get(memory_id).await?.ok_or(EngineError::NotFound {
                kind: "memory",
                id: memory_id.to_string(),
            })?;
            let (old, replacement) =
                lifecycle::revise(&current, new_summary, new_detail, Utc::now())?;

            let mut tx = self.pool.begin().await?;
            let updated = update_row(&mut *tx, &old, current.version).await?;
            if updated == 0 {
                tx.rollback().await?;
                debug!(memory_id, "version conflict during revise, retrying");
                continue;
            }
            insert_row(&mut *tx, &replacement).await?;
            tx.commit().await?;

            let mut old = old;
            old.version = current.version + 1;
            return Ok((old, replacement));
        }
    }

    /// One decay pass over non-terminal memories. Safe and idempotent.
    ///
    /// Memories reinforced within `grace` of now count as active and are
    /// skipped this pass; everyone else loses one decay step.
    pub async fn run_decay_cycle(&self, grace: chrono::Duration) -> Result<DecayCycleReport> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM memories WHERE stage NOT IN ('archived', 'revised') \
             ORDER BY updated_at ASC, id ASC LIMIT $1",
        )
        .bind(DECAY_BATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut report = DecayCycleReport::default();
        for id in ids {
            report.scanned += 1;
            match self.decay_one(&id, grace).await? {
                DecayOutcome::Skipped => report.skipped += 1,
                DecayOutcome::Decayed => report.decayed += 1,
                DecayOutcome::Archived => report.archived += 1,
            }
        }

        info!(
            scanned = report.scanned,
            decayed = report.decayed,
            archived = report.archived,
            skipped = report.skipped,
            "decay cycle complete"
        );
        Ok(report)
    }

    async fn decay_one(&self, memory_id: &str, grace: chrono::Duration) -> Result<DecayOutcome> {
        loop {
            let Some(current) = self.get(memory_id).await? else {
                return Ok(DecayOutcome::Skipped);
            };
            // Re-checked on every retry: a reinforcement racing this pass
            // makes the memory active again.
            if current.stage.is_terminal() {
                return Ok(DecayOutcome::Skipped);
            }
            let cutoff = Utc::now() - grace;
            if current.last_reinforced_at.is_some_and(|at| at > cutoff) {
                return Ok(DecayOutcome::Skipped);
            }

            let next = lifecycle::decay(&current, &self.lifecycle, Utc::now())?;
            let archived = next.stage == MemoryStage::Archived;
            let updated = update_row(&self.pool, &next, current.version).await?;
            if updated == 1 {
                return Ok(if archived {
                    DecayOutcome::Archived
                } else {
                    DecayOutcome::Decayed
                });
            }
            debug!(memory_id, "version conflict during decay, retrying");
        }
    }

    async fn mutate<F>(&self, memory_id: &str, transition: F) -> Result<Memory>
    where
        F: Fn(&Memory) -> Result<Memory>,
    {
        loop {
            let current = self.get(memory_id).await?.ok_or(EngineError::NotFound {
                kind: "memory",
                id: memory_id.to_string(),
            })?;
            let mut next = transition(&current)?;
            let updated = update_row(&self.pool, &next, current.version).await?;
            if updated == 1 {
                next.version = current.version + 1;
                return Ok(next);
            }
            debug!(memory_id, "version conflict, retrying mutation");
        }
    }

    async fn insert(&self, memory: &Memory) -> Result<()> {
        insert_row(&self.pool, memory).await
    }
}

enum DecayOutcome {
    Skipped,
    Decayed,
    Archived,
}

/// Spawn the background decay task.
///
/// `interval` is the time between decay passes; it doubles as the
/// reinforcement grace window, so a memory reinforced during the current
/// period is not decayed by the pass that closes it.
pub fn spawn_decay_scheduler(
    store: Arc<MemoryStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let grace = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::hours(1));
        loop {
            if let Err(err) = store.run_decay_cycle(grace).await {
                warn!("decay cycle failed: {err}");
            }
            tokio::time::sleep(interval).await;
        }
    })
}

// ============================================================================
// Row mapping
// ============================================================================

async fn insert_row<'e, E>(executor: E, memory: &Memory) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO memories
            (id, entity_id, category, stage, confidence, summary, detail,
             tags, temporal, superseded_by, last_reinforced_at, version,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(&memory.id)
    .bind(&memory.entity_id)
    .bind(memory.category.as_str())
    .bind(memory.stage.as_str())
    .bind(memory.confidence)
    .bind(&memory.summary)
    .bind(&memory.detail)
    .bind(serde_json::to_string(&memory.tags)?)
    .bind(serde_json::to_string(&memory.temporal)?)
    .bind(&memory.superseded_by)
    .bind(memory.last_reinforced_at.map(|at| at.timestamp()))
    .bind(memory.version)
    .bind(memory.created_at.timestamp())
    .bind(memory.updated_at.timestamp())
    .execute(executor)
    .await?;
    Ok(())
}

async fn update_row<'e, E>(executor: E, memory: &Memory, expected_version: i64) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE memories SET
            stage = $1, confidence = $2, summary = $3, detail = $4,
            tags = $5, temporal = $6, superseded_by = $7,
            last_reinforced_at = $8, updated_at = $9,
            version = version + 1
        WHERE id = $10 AND version = $11
        "#,
    )
    .bind(memory.stage.as_str())
    .bind(memory.confidence)
    .bind(&memory.summary)
    .bind(&memory.detail)
    .bind(serde_json::to_string(&memory.tags)?)
    .bind(serde_json::to_string(&memory.temporal)?)
    .bind(&memory.superseded_by)
    .bind(memory.last_reinforced_at.map(|at| at.timestamp()))
    .bind(memory.updated_at.timestamp())
    .bind(&memory.id)
    .bind(expected_version)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

fn row_to_memory(row: &SqliteRow) -> Result<Memory> {
    let decode = |field: &str, err: String| {
        EngineError::Persistence(sqlx::Error::Decode(
            format!("memories.{field}: {err}").into(),
        ))
    };

    let category: String = row.get("category");
    let stage: String = row.get("stage");
    let tags: String = row.get("tags");
    let temporal: String = row.get("temporal");

    Ok(Memory {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        category: category
            .parse::<MemoryCategory>()
            .map_err(|e| decode("category", e))?,
        stage: stage
            .parse::<MemoryStage>()
            .map_err(|e| decode("stage", e))?,
        confidence: row.get("confidence"),
        summary: row.get("summary"),
        detail: row.get("detail"),
        tags: serde_json::from_str(&tags)?,
        temporal: serde_json::from_str::<TemporalMetadata>(&temporal)?,
        superseded_by: row.get("superseded_by"),
        last_reinforced_at: row
            .get::<Option<i64>, _>("last_reinforced_at")
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        version: row.get("version"),
        created_at: Utc
            .timestamp_opt(row.get::<i64, _>("created_at"), 0)
            .single()
            .unwrap_or_default(),
        updated_at: Utc
            .timestamp_opt(row.get::<i64, _>("updated_at"), 0)
            .single()
            .unwrap_or_default(),
    })
}
