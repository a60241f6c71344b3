// src/storage/manifests.rs
//! Append-only manifest persistence.
//!
//! A manifest row is written once, after a fully successful assembly, and
//! never mutated. `created_at` is stamped here so the in-memory manifest
//! stays byte-deterministic.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use crate::engine::manifest::{BudgetUsage, Manifest, ManifestEntry};
use crate::engine::situation::Situation;
use crate::error::Result;

/// A persisted manifest row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredManifest {
    pub id: i64,
    pub manifest: Manifest,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ManifestStore {
    pool: SqlitePool,
}

impl ManifestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a manifest; returns the new row id.
    pub async fn persist(&self, manifest: &Manifest) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO manifests
                (entity_id, mode, situation, budget, entries, assembled_text,
                 total_considered, over_floor_budget, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&manifest.entity_id)
        .bind(&manifest.mode)
        .bind(serde_json::to_string(&manifest.situation)?)
        .bind(serde_json::to_string(&manifest.budget)?)
        .bind(serde_json::to_string(&manifest.entries)?)
        .bind(&manifest.assembled_text)
        .bind(manifest.total_considered as i64)
        .bind(manifest.over_floor_budget as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(manifest_id = id, entity_id = %manifest.entity_id, "persisted manifest");
        Ok(id)
    }

    /// Most recent manifest for an entity, if any.
    pub async fn latest(&self, entity_id: &str) -> Result<Option<StoredManifest>> {
        let row = sqlx::query(
            "SELECT * FROM manifests WHERE entity_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_stored(&r)).transpose()
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredManifest>> {
        let row = sqlx::query("SELECT * FROM manifests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_stored(&r)).transpose()
    }
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredManifest> {
    let situation: String = row.get("situation");
    let budget: String = row.get("budget");
    let entries: String = row.get("entries");

    let manifest = Manifest {
        entity_id: row.get("entity_id"),
        mode: row.get("mode"),
        situation: serde_json::from_str::<Situation>(&situation)?,
        budget: serde_json::from_str::<BudgetUsage>(&budget)?,
        entries: serde_json::from_str::<Vec<ManifestEntry>>(&entries)?,
        assembled_text: row.get("assembled_text"),
        total_considered: row.get::<i64, _>("total_considered") as usize,
        over_floor_budget: row.get::<i64, _>("over_floor_budget") != 0,
    };

    Ok(StoredManifest {
        id: row.get("id"),
        manifest,
        created_at: Utc
            .timestamp_opt(row.get::<i64, _>("created_at"), 0)
            .single()
            .unwrap_or_default(),
    })
}
