// src/engine/budget.rs
//! Budget allocator: capacity-constrained selection of scored candidates.
//!
//! Selection is a greedy-by-priority bin fill, not an optimal knapsack
//! solve: determinism and explainability win over size-optimality. The
//! `always` tier is a hard floor: attempted first regardless of score and
//! included even when the floor alone overflows the ceiling, in which case
//! the manifest is flagged rather than the call failing.

use crate::engine::block::Tier;
use crate::engine::manifest::ExcludeReason;

/// A scored, sized candidate flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub category: String,
    pub tier: Tier,
    pub base_priority: f64,
    pub score: f64,
    pub size: usize,
    pub text: String,
    pub signals: Vec<String>,
    /// Declaration position in the registry; final tie-break key.
    pub position: usize,
    /// Set for candidates filtered before sizing (no data / gate failed).
    pub pre_excluded: Option<ExcludeReason>,
}

/// One allocator verdict, in selection order.
#[derive(Debug, Clone)]
pub struct SelectionEntry {
    pub candidate: Candidate,
    pub included: bool,
    pub reason: Option<ExcludeReason>,
}

/// Full allocator output consumed by the formatter and manifest recorder.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Every candidate considered: floor first, then ranked conditionals,
    /// then pre-excluded candidates.
    pub entries: Vec<SelectionEntry>,
    pub used_tokens: usize,
    pub over_floor_budget: bool,
}

/// Rank ordering: score descending, then tier (`always`, `strong_signal`,
/// `conditional`), then registry declaration order. The sort is stable so
/// equal keys preserve declaration order.
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.tier.tie_break_rank().cmp(&b.tier.tie_break_rank()))
            .then(a.position.cmp(&b.position))
    });
}

/// Select candidates within `token_ceiling`.
///
/// Pre-excluded candidates pass straight through to the audit trail. The
/// `always` floor is attempted first; remaining candidates fill greedily by
/// rank without stopping at the first overflow, since a smaller lower-ranked
/// block may still fit.
pub fn select(candidates: Vec<Candidate>, token_ceiling: usize) -> Selection {
    let mut floor: Vec<Candidate> = Vec::new();
    let mut ranked: Vec<Candidate> = Vec::new();
    let mut pre_excluded: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        if candidate.pre_excluded.is_some() {
            pre_excluded.push(candidate);
        } else if candidate.tier == Tier::Always {
            floor.push(candidate);
        } else {
            ranked.push(candidate);
        }
    }

    rank(&mut floor);
    rank(&mut ranked);

    let mut entries: Vec<SelectionEntry> = Vec::new();
    let mut used: usize = 0;
    let mut floor_used: usize = 0;

    // Hard floor: always-tier blocks are included regardless of the running
    // total. The single exemption is a block that alone exceeds the entire
    // ceiling; that one can never fit and is excluded like any other.
    for candidate in floor {
        if candidate.size > token_ceiling {
            entries.push(SelectionEntry {
                candidate,
                included: false,
                reason: Some(ExcludeReason::OverBudget),
            });
            continue;
        }
        used += candidate.size;
        floor_used += candidate.size;
        entries.push(SelectionEntry {
            candidate,
            included: true,
            reason: None,
        });
    }

    let over_floor_budget = floor_used > token_ceiling;

    for candidate in ranked {
        if used + candidate.size <= token_ceiling {
            used += candidate.size;
            entries.push(SelectionEntry {
                candidate,
                included: true,
                reason: None,
            });
        } else {
            entries.push(SelectionEntry {
                candidate,
                included: false,
                reason: Some(ExcludeReason::OverBudget),
            });
        }
    }

    for candidate in pre_excluded {
        let reason = candidate.pre_excluded;
        entries.push(SelectionEntry {
            candidate,
            included: false,
            reason,
        });
    }

    Selection {
        entries,
        used_tokens: used,
        over_floor_budget,
    }
}
