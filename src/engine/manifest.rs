// src/engine/manifest.rs
//! Manifest types: the full audit record of one assembly call.
//!
//! Every candidate the engine considered appears exactly once, included or
//! not, with its final score, measured size, and the reason it was left out.
//! The manifest deliberately carries no wall-clock field: identical inputs
//! must produce byte-identical manifests. Persistence stamps `created_at`.

use serde::{Deserialize, Serialize};

use crate::engine::block::Tier;
use crate::engine::situation::Situation;

/// Why a candidate was excluded from the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeReason {
    /// Inclusion predicate returned false.
    NotApplicable,
    /// No raw data was supplied under the block's gatherer key.
    NoData,
    /// The block did not fit the remaining budget.
    OverBudget,
}

impl ExcludeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcludeReason::NotApplicable => "not_applicable",
            ExcludeReason::NoData => "no_data",
            ExcludeReason::OverBudget => "over_budget",
        }
    }
}

/// One candidate's line in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub block_key: String,
    pub category: String,
    pub tier: Tier,
    pub base_priority: f64,
    /// Final score after rules and goal adjustments.
    pub score: f64,
    /// Measured size in tokens (0 for candidates never rendered).
    pub size: usize,
    pub included: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExcludeReason>,
    /// Audit trail of applied adjustments, e.g. `rule:crisis:+30`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
}

/// Budget accounting for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub mode: String,
    pub token_ceiling: usize,
    pub used_tokens: usize,
    /// Negative when `always`-tier content overflowed the ceiling.
    pub remaining_tokens: i64,
    pub blocks_included: usize,
    pub blocks_excluded: usize,
}

/// Complete record of an assembly: what went in, what stayed out, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub entity_id: String,
    pub mode: String,
    pub situation: Situation,
    pub budget: BudgetUsage,
    pub entries: Vec<ManifestEntry>,
    pub assembled_text: String,
    pub total_considered: usize,
    /// Set when the `always`-tier floor alone exceeded the ceiling.
    #[serde(default)]
    pub over_floor_budget: bool,
}

impl Manifest {
    /// Compact summary suitable for a decision log row.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "mode": self.mode,
            "token_ceiling": self.budget.token_ceiling,
            "used_tokens": self.budget.used_tokens,
            "blocks_included": self.budget.blocks_included,
            "blocks_excluded": self.budget.blocks_excluded,
            "over_floor_budget": self.over_floor_budget,
            "included_keys": self
                .entries
                .iter()
                .filter(|e| e.included)
                .map(|e| e.block_key.as_str())
                .collect::<Vec<_>>(),
        })
    }
}
