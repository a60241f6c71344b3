// src/memory/types.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::temporal::TemporalMetadata;

/// Confidence assigned to every newly created memory.
pub const INITIAL_CONFIDENCE: f64 = 0.2;

/// Lifecycle stage of a persistent memory.
///
/// `draft → reinforced → mature → decaying → {revised | archived}`.
/// The two terminal stages may be entered from anywhere; every other
/// transition moves one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStage {
    Draft,
    Reinforced,
    Mature,
    Decaying,
    Revised,
    Archived,
}

impl MemoryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStage::Draft => "draft",
            MemoryStage::Reinforced => "reinforced",
            MemoryStage::Mature => "mature",
            MemoryStage::Decaying => "decaying",
            MemoryStage::Revised => "revised",
            MemoryStage::Archived => "archived",
        }
    }

    /// Terminal stages accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryStage::Revised | MemoryStage::Archived)
    }
}

// Parse stages defensively for DB/text interop
impl FromStr for MemoryStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(MemoryStage::Draft),
            "reinforced" => Ok(MemoryStage::Reinforced),
            "mature" => Ok(MemoryStage::Mature),
            "decaying" => Ok(MemoryStage::Decaying),
            "revised" => Ok(MemoryStage::Revised),
            "archived" => Ok(MemoryStage::Archived),
            other => Err(format!("unknown memory stage: {other}")),
        }
    }
}

/// Fixed category set for persistent memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    BehavioralPattern,
    OngoingThread,
    EmotionalSignature,
    DomainKnowledge,
    BreakthroughMoment,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::BehavioralPattern => "behavioral_pattern",
            MemoryCategory::OngoingThread => "ongoing_thread",
            MemoryCategory::EmotionalSignature => "emotional_signature",
            MemoryCategory::DomainKnowledge => "domain_knowledge",
            MemoryCategory::BreakthroughMoment => "breakthrough_moment",
        }
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "behavioral_pattern" => Ok(MemoryCategory::BehavioralPattern),
            "ongoing_thread" => Ok(MemoryCategory::OngoingThread),
            "emotional_signature" => Ok(MemoryCategory::EmotionalSignature),
            "domain_knowledge" => Ok(MemoryCategory::DomainKnowledge),
            "breakthrough_moment" => Ok(MemoryCategory::BreakthroughMoment),
            other => Err(format!("unknown memory category: {other}")),
        }
    }
}

/// Entity-scoped persistent knowledge with a confidence-weighted lifecycle.
///
/// `version` backs the store's compare-and-set discipline: every mutation
/// bumps it, and a mutation only lands if the version it read still holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub entity_id: String,
    pub category: MemoryCategory,
    pub stage: MemoryStage,
    pub confidence: f64,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub temporal: TemporalMetadata,
    /// Id of the memory that replaced this one; set when stage is `revised`.
    /// A plain identifier looked up on demand, never an owning reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reinforced_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Fresh draft memory at the initial confidence.
    pub fn new(
        entity_id: impl Into<String>,
        category: MemoryCategory,
        summary: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            category,
            stage: MemoryStage::Draft,
            confidence: INITIAL_CONFIDENCE,
            summary: summary.into(),
            detail: String::new(),
            tags: Vec::new(),
            temporal: TemporalMetadata {
                first_observed: Some(now),
                last_observed: Some(now),
                occurrences: 1,
                ..TemporalMetadata::default()
            },
            superseded_by: None,
            last_reinforced_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
