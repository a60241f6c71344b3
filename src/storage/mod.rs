// src/storage/mod.rs
//! SQLite setup: pool construction and idempotent schema migrations.
//!
//! Run migrations at every startup; each statement is safe to repeat.

pub mod manifests;

use sqlx::{Executor, SqlitePool, sqlite::SqlitePoolOptions};

use crate::error::Result;

pub use manifests::{ManifestStore, StoredManifest};

const CREATE_GOALS: &str = r#"
CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    priority_adjustments TEXT NOT NULL DEFAULT '{}',
    progress REAL NOT NULL DEFAULT 0.0,
    target_date INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

const CREATE_MEMORIES: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    category TEXT NOT NULL,
    stage TEXT NOT NULL,
    confidence REAL NOT NULL,
    summary TEXT NOT NULL,
    detail TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    temporal TEXT NOT NULL DEFAULT '{}',
    superseded_by TEXT,
    last_reinforced_at INTEGER,
    version INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

const CREATE_DECISION_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS decision_log (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    manifest_summary TEXT NOT NULL,
    memories_used TEXT NOT NULL DEFAULT '[]',
    active_goals TEXT NOT NULL DEFAULT '[]',
    recommendation TEXT NOT NULL DEFAULT '',
    outcome TEXT,
    created_at INTEGER NOT NULL
);
"#;

const CREATE_MANIFESTS: &str = r#"
CREATE TABLE IF NOT EXISTS manifests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    situation TEXT NOT NULL,
    budget TEXT NOT NULL,
    entries TEXT NOT NULL,
    assembled_text TEXT NOT NULL,
    total_considered INTEGER NOT NULL,
    over_floor_budget INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_goals_entity ON goals(entity_id, status);
CREATE INDEX IF NOT EXISTS idx_memories_entity ON memories(entity_id, stage);
CREATE INDEX IF NOT EXISTS idx_decision_log_entity ON decision_log(entity_id, created_at);
CREATE INDEX IF NOT EXISTS idx_manifests_entity ON manifests(entity_id, created_at);
"#;

/// Connect a pool to the given database URL (e.g. `sqlite://tessera.db?mode=rwc`
/// or `sqlite::memory:`).
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Runs all required migrations. Safe to call at every startup (idempotent).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_GOALS).await?;
    pool.execute(CREATE_MEMORIES).await?;
    pool.execute(CREATE_DECISION_LOG).await?;
    pool.execute(CREATE_MANIFESTS).await?;
    pool.execute(CREATE_INDICES).await?;
    Ok(())
}
