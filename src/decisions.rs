// src/decisions.rs
//! Decision log: the recommendation/outcome pairing used for rule tuning.
//!
//! Rows are append-only. The single permitted later mutation is attaching an
//! outcome, exactly once; everything else about a recorded decision is
//! frozen at creation.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Outcome attached by the caller after the fact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// Whether the recommendation was followed.
    pub followed: bool,
    /// Observed result metrics, free-form.
    #[serde(default)]
    pub result: std::collections::BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub entity_id: String,
    pub mode: String,
    /// Compact manifest summary frozen at record time.
    pub manifest_summary: serde_json::Value,
    #[serde(default)]
    pub memories_used: Vec<String>,
    #[serde(default)]
    pub active_goals: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DecisionOutcome>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a decision
#[derive(Debug, Clone)]
pub struct RecordDecisionInput {
    pub entity_id: String,
    pub mode: String,
    pub manifest_summary: serde_json::Value,
    pub memories_used: Vec<String>,
    pub active_goals: Vec<String>,
    pub recommendation: String,
}

#[derive(Clone)]
pub struct DecisionStore {
    pool: SqlitePool,
}

impl DecisionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, input: RecordDecisionInput) -> Result<DecisionRecord> {
        let record = DecisionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: input.entity_id,
            mode: input.mode,
            manifest_summary: input.manifest_summary,
            memories_used: input.memories_used,
            active_goals: input.active_goals,
            recommendation: input.recommendation,
            outcome: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO decision_log
                (id, entity_id, mode, manifest_summary, memories_used,
                 active_goals, recommendation, outcome, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.entity_id)
        .bind(&record.mode)
        .bind(serde_json::to_string(&record.manifest_summary)?)
        .bind(serde_json::to_string(&record.memories_used)?)
        .bind(serde_json::to_string(&record.active_goals)?)
        .bind(&record.recommendation)
        .bind(record.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        debug!(decision_id = %record.id, entity_id = %record.entity_id, "recorded decision");
        Ok(record)
    }

    pub async fn get(&self, decision_id: &str) -> Result<Option<DecisionRecord>> {
        let row = sqlx::query("SELECT * FROM decision_log WHERE id = $1")
            .bind(decision_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    pub async fn list_by_entity(&self, entity_id: &str, limit: i64) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM decision_log WHERE entity_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Attach an outcome to a recorded decision. Allowed exactly once.
    pub async fn attach_outcome(
        &self,
        decision_id: &str,
        outcome: DecisionOutcome,
    ) -> Result<DecisionRecord> {
        let mut record = self
            .get(decision_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "decision",
                id: decision_id.to_string(),
            })?;

        if record.outcome.is_some() {
            return Err(EngineError::invalid_transition(
                format!("decision {decision_id}"),
                "outcome_attached",
                "attach_outcome",
            ));
        }

        sqlx::query("UPDATE decision_log SET outcome = $1 WHERE id = $2 AND outcome IS NULL")
            .bind(serde_json::to_string(&outcome)?)
            .bind(decision_id)
            .execute(&self.pool)
            .await?;

        record.outcome = Some(outcome);
        Ok(record)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<DecisionRecord> {
    let manifest_summary: String = row.get("manifest_summary");
    let memories_used: String = row.get("memories_used");
    let active_goals: String = row.get("active_goals");
    let outcome: Option<String> = row.get("outcome");

    Ok(DecisionRecord {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        mode: row.get("mode"),
        manifest_summary: serde_json::from_str(&manifest_summary)?,
        memories_used: serde_json::from_str(&memories_used)?,
        active_goals: serde_json::from_str(&active_goals)?,
        recommendation: row.get("recommendation"),
        outcome: outcome.map(|o| serde_json::from_str(&o)).transpose()?,
        created_at: Utc
            .timestamp_opt(row.get::<i64, _>("created_at"), 0)
            .single()
            .unwrap_or_default(),
    })
}
