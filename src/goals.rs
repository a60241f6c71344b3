// src/goals.rs
//! Goals: entity-scoped priority bias that outlives any single call.
//!
//! An active goal adds its adjustments on top of rule scoring for a period
//! of weeks. Goals are never deleted; they transition to a terminal status
//! (`completed` / `abandoned`) and stay on the record.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Paused => "paused",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Abandoned)
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(GoalStatus::Active),
            "paused" => Ok(GoalStatus::Paused),
            "completed" => Ok(GoalStatus::Completed),
            "abandoned" => Ok(GoalStatus::Abandoned),
            other => Err(format!("unknown goal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub entity_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: GoalStatus,
    /// block key -> signed priority delta while this goal is active.
    #[serde(default)]
    pub priority_adjustments: BTreeMap<String, f64>,
    /// Completion fraction in [0, 1].
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(entity_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            name: name.into(),
            description: String::new(),
            status: GoalStatus::Active,
            priority_adjustments: BTreeMap::new(),
            progress: 0.0,
            target_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a goal
#[derive(Debug, Clone, Default)]
pub struct CreateGoalInput {
    pub entity_id: String,
    pub name: String,
    pub description: Option<String>,
    pub priority_adjustments: BTreeMap<String, f64>,
    pub target_date: Option<DateTime<Utc>>,
}

/// Input for patching a goal
#[derive(Debug, Clone, Default)]
pub struct UpdateGoalInput {
    pub goal_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<GoalStatus>,
    pub progress: Option<f64>,
    pub priority_adjustments: Option<BTreeMap<String, f64>>,
}

#[derive(Clone)]
pub struct GoalStore {
    pool: SqlitePool,
}

impl GoalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateGoalInput) -> Result<Goal> {
        if input.name.is_empty() {
            return Err(EngineError::Configuration("goal name is required".into()));
        }
        let mut goal = Goal::new(input.entity_id, input.name);
        goal.description = input.description.unwrap_or_default();
        goal.priority_adjustments = input.priority_adjustments;
        goal.target_date = input.target_date;

        sqlx::query(
            r#"
            INSERT INTO goals
                (id, entity_id, name, description, status, priority_adjustments,
                 progress, target_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&goal.id)
        .bind(&goal.entity_id)
        .bind(&goal.name)
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(serde_json::to_string(&goal.priority_adjustments)?)
        .bind(goal.progress)
        .bind(goal.target_date.map(|at| at.timestamp()))
        .bind(goal.created_at.timestamp())
        .bind(goal.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        debug!(goal_id = %goal.id, entity_id = %goal.entity_id, "created goal");
        Ok(goal)
    }

    pub async fn get(&self, goal_id: &str) -> Result<Option<Goal>> {
        let row = sqlx::query("SELECT * FROM goals WHERE id = $1")
            .bind(goal_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_goal(&r)).transpose()
    }

    /// List an entity's goals, oldest first. Terminal goals are excluded
    /// unless requested.
    pub async fn list_by_entity(&self, entity_id: &str, include_finished: bool) -> Result<Vec<Goal>> {
        let sql = if include_finished {
            "SELECT * FROM goals WHERE entity_id = $1 ORDER BY created_at ASC, id ASC"
        } else {
            "SELECT * FROM goals WHERE entity_id = $1 \
             AND status NOT IN ('completed', 'abandoned') ORDER BY created_at ASC, id ASC"
        };
        let rows = sqlx::query(sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_goal).collect()
    }

    /// Active goals only, the set that biases scoring.
    pub async fn active_for_entity(&self, entity_id: &str) -> Result<Vec<Goal>> {
        let rows = sqlx::query(
            "SELECT * FROM goals WHERE entity_id = $1 AND status = 'active' \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_goal).collect()
    }

    /// Patch a goal. Status changes out of a terminal status are rejected.
    pub async fn update(&self, input: UpdateGoalInput) -> Result<Goal> {
        let mut goal = self
            .get(&input.goal_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "goal",
                id: input.goal_id.clone(),
            })?;

        if let Some(status) = input.status {
            if goal.status.is_terminal() && status != goal.status {
                return Err(EngineError::invalid_transition(
                    format!("goal {}", goal.id),
                    goal.status.as_str(),
                    format!("set status {}", status.as_str()),
                ));
            }
            goal.status = status;
        }
        if let Some(name) = input.name {
            goal.name = name;
        }
        if let Some(description) = input.description {
            goal.description = description;
        }
        if let Some(progress) = input.progress {
            goal.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(adjustments) = input.priority_adjustments {
            goal.priority_adjustments = adjustments;
        }
        goal.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE goals SET
                name = $1, description = $2, status = $3,
                priority_adjustments = $4, progress = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&goal.name)
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(serde_json::to_string(&goal.priority_adjustments)?)
        .bind(goal.progress)
        .bind(goal.updated_at.timestamp())
        .bind(&goal.id)
        .execute(&self.pool)
        .await?;

        Ok(goal)
    }
}

fn row_to_goal(row: &SqliteRow) -> Result<Goal> {
    let status: String = row.get("status");
    let adjustments: String = row.get("priority_adjustments");
    Ok(Goal {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        name: row.get("name"),
        description: row.get("description"),
        status: status.parse::<GoalStatus>().map_err(|e| {
            EngineError::Persistence(sqlx::Error::Decode(format!("goals.status: {e}").into()))
        })?,
        priority_adjustments: serde_json::from_str(&adjustments)?,
        progress: row.get("progress"),
        target_date: row
            .get::<Option<i64>, _>("target_date")
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
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
