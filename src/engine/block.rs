// src/engine/block.rs
//! Block definitions: the static, per-deployment catalog of knowledge
//! categories the engine can include in an assembly.
//!
//! A block definition is immutable configuration, never entity state. Render
//! and inclusion logic are referenced by name and resolved against the
//! function registry when the engine is built, so configuration stays
//! serializable and inspectable.

use serde::{Deserialize, Serialize};

/// Priority class of a block.
///
/// `always` blocks form the baseline context floor; `conditional` blocks
/// join when their inclusion gate passes; `strong_signal` blocks only earn
/// their slot through scoring-rule boosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Always,
    Conditional,
    StrongSignal,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Conditional
    }
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Always => "always",
            Tier::Conditional => "conditional",
            Tier::StrongSignal => "strong_signal",
        }
    }

    /// Rank used to break score ties during selection:
    /// `always` first, then `strong_signal`, then `conditional`.
    pub fn tie_break_rank(&self) -> u8 {
        match self {
            Tier::Always => 0,
            Tier::StrongSignal => 1,
            Tier::Conditional => 2,
        }
    }
}

/// Default base priority per tier. Overridable in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierPriorities {
    pub always: f64,
    pub conditional: f64,
    pub strong_signal: f64,
}

impl Default for TierPriorities {
    fn default() -> Self {
        Self {
            always: 90.0,
            conditional: 60.0,
            strong_signal: 30.0,
        }
    }
}

impl TierPriorities {
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Always => self.always,
            Tier::Conditional => self.conditional,
            Tier::StrongSignal => self.strong_signal,
        }
    }
}

/// Serializable block definition for engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    /// Unique key within one configuration.
    pub key: String,
    #[serde(default)]
    pub tier: Tier,
    /// Seed score; defaults from the tier priority map when absent.
    #[serde(default)]
    pub base_priority: Option<f64>,
    /// Grouping label carried through to manifest entries.
    #[serde(default = "default_category")]
    pub category: String,
    /// Key into the caller's raw data map; defaults to `key`.
    #[serde(default)]
    pub gatherer_key: Option<String>,
    /// Name of the registered formatter function. Required.
    pub render: String,
    /// Name of the registered inclusion predicate. Absent means the block is
    /// always a candidate (subject to its data being present).
    #[serde(default)]
    pub should_include: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_category() -> String {
    "context".to_string()
}

impl BlockDef {
    pub fn gatherer_key(&self) -> &str {
        self.gatherer_key.as_deref().unwrap_or(&self.key)
    }

    pub fn effective_priority(&self, tiers: &TierPriorities) -> f64 {
        self.base_priority.unwrap_or_else(|| tiers.for_tier(self.tier))
    }
}
