// src/memory/lifecycle.rs
//! The confidence-weighted lifecycle state machine.
//!
//! All transitions are pure functions over a memory value; the store applies
//! them under compare-and-set so concurrent reinforcements and decay checks
//! never lose an update. Confidence rules:
//!
//! - reinforce: `new = old + (1 - old) * gain`, strictly increasing,
//!   asymptotic to 1.0
//! - decay: flat `-step` per check, clamped at 0
//!
//! Stage promotion happens on reinforcement once confidence crosses the
//! configured thresholds, one stage at a time. The terminal stages
//! (`archived`, `revised`) may be entered from any stage and accept nothing
//! further.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::memory::types::{Memory, MemoryStage};

const CONFIDENCE_FLOOR_EPSILON: f64 = 1e-9;

/// Tunable lifecycle parameters, loadable from the `[lifecycle]` section of
/// the engine configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Fraction of the remaining headroom gained per reinforcement.
    pub reinforce_gain: f64,
    /// Flat confidence loss per decay check.
    pub decay_step: f64,
    /// Confidence at which a reinforced draft is promoted.
    pub draft_promotion: f64,
    /// Confidence at which a reinforced memory matures.
    pub mature_promotion: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reinforce_gain: 0.15,
            decay_step: 0.05,
            draft_promotion: 0.4,
            mature_promotion: 0.7,
        }
    }
}

fn reject_terminal(memory: &Memory, action: &str) -> Result<()> {
    if memory.stage.is_terminal() {
        return Err(EngineError::invalid_transition(
            format!("memory {}", memory.id),
            memory.stage.as_str(),
            action,
        ));
    }
    Ok(())
}

/// Apply one reinforcement.
///
/// Confidence moves toward 1.0 by `gain` of the remaining headroom; the
/// stage is promoted at most one step per call:
/// draft → reinforced at `draft_promotion`, reinforced → mature at
/// `mature_promotion`, decaying → mature (revival).
pub fn reinforce(memory: &Memory, config: &LifecycleConfig, now: DateTime<Utc>) -> Result<Memory> {
    reject_terminal(memory, "reinforce")?;

    let mut next = memory.clone();
    next.confidence = memory.confidence + (1.0 - memory.confidence) * config.reinforce_gain;
    next.stage = match memory.stage {
        MemoryStage::Draft if next.confidence >= config.draft_promotion => MemoryStage::Reinforced,
        MemoryStage::Reinforced if next.confidence >= config.mature_promotion => {
            MemoryStage::Mature
        }
        MemoryStage::Decaying => MemoryStage::Mature,
        stage => stage,
    };

    next.temporal.occurrences += 1;
    next.temporal.last_observed = Some(now);
    if next.temporal.first_observed.is_none() {
        next.temporal.first_observed = Some(now);
    }
    next.last_reinforced_at = Some(now);
    next.updated_at = now;
    Ok(next)
}

/// Apply one decay check to a memory that saw no reinforcement.
///
/// Confidence drops by the flat step; a mature memory starts decaying, and
/// any memory whose confidence bottoms out is archived.
pub fn decay(memory: &Memory, config: &LifecycleConfig, now: DateTime<Utc>) -> Result<Memory> {
    reject_terminal(memory, "decay")?;

    let mut next = memory.clone();
    next.confidence = (memory.confidence - config.decay_step).max(0.0);
    next.stage = if next.confidence <= CONFIDENCE_FLOOR_EPSILON {
        next.confidence = 0.0;
        MemoryStage::Archived
    } else if memory.stage == MemoryStage::Mature {
        MemoryStage::Decaying
    } else {
        memory.stage
    };
    next.updated_at = now;
    Ok(next)
}

/// Replace a memory with a fresh draft, keeping lineage.
///
/// The old memory becomes `revised` (immutable) and points at its
/// replacement through `superseded_by`; the replacement starts the
/// lifecycle over at the initial draft confidence.
pub fn revise(
    memory: &Memory,
    new_summary: &str,
    new_detail: &str,
    now: DateTime<Utc>,
) -> Result<(Memory, Memory)> {
    reject_terminal(memory, "revise")?;

    let mut replacement = Memory::new(memory.entity_id.clone(), memory.category, new_summary, now);
    replacement.detail = if new_detail.is_empty() {
        format!("Previously: {}", memory.summary)
    } else {
        new_detail.to_string()
    };
    replacement.tags = memory.tags.clone();

    let mut old = memory.clone();
    old.stage = MemoryStage::Revised;
    old.superseded_by = Some(replacement.id.clone());
    old.updated_at = now;

    Ok((old, replacement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryCategory, INITIAL_CONFIDENCE};

    fn draft() -> Memory {
        Memory::new(
            "entity-1",
            MemoryCategory::BehavioralPattern,
            "shortens backswing under pressure",
            Utc::now(),
        )
    }

    #[test]
    fn test_single_reinforce_from_initial() {
        let config = LifecycleConfig::default();
        let next = reinforce(&draft(), &config, Utc::now()).unwrap();
        assert!((next.confidence - 0.32).abs() < 1e-12);
        // below the promotion threshold: still a draft
        assert_eq!(next.stage, MemoryStage::Draft);
        assert_eq!(next.temporal.occurrences, 2);
    }

    #[test]
    fn test_confidence_strictly_increasing_below_one() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        let mut previous = memory.confidence;
        for _ in 0..200 {
            memory = reinforce(&memory, &config, Utc::now()).unwrap();
            assert!(memory.confidence > previous);
            assert!(memory.confidence < 1.0);
            previous = memory.confidence;
        }
    }

    #[test]
    fn test_promotion_never_skips_a_stage() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        // Force a high confidence while still a draft; one reinforce may only
        // promote one step.
        memory.confidence = 0.9;
        let next = reinforce(&memory, &config, Utc::now()).unwrap();
        assert_eq!(next.stage, MemoryStage::Reinforced);
        let next = reinforce(&next, &config, Utc::now()).unwrap();
        assert_eq!(next.stage, MemoryStage::Mature);
    }

    #[test]
    fn test_promotion_chain_via_repeated_reinforcement() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        let mut seen = vec![memory.stage];
        for _ in 0..12 {
            memory = reinforce(&memory, &config, Utc::now()).unwrap();
            if *seen.last().unwrap() != memory.stage {
                seen.push(memory.stage);
            }
        }
        assert_eq!(
            seen,
            vec![
                MemoryStage::Draft,
                MemoryStage::Reinforced,
                MemoryStage::Mature
            ]
        );
    }

    #[test]
    fn test_mature_decays_then_archives() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        memory.stage = MemoryStage::Mature;
        memory.confidence = 0.12;

        memory = decay(&memory, &config, Utc::now()).unwrap();
        assert_eq!(memory.stage, MemoryStage::Decaying);
        assert!((memory.confidence - 0.07).abs() < 1e-12);

        memory = decay(&memory, &config, Utc::now()).unwrap();
        assert_eq!(memory.stage, MemoryStage::Decaying);

        memory = decay(&memory, &config, Utc::now()).unwrap();
        assert_eq!(memory.stage, MemoryStage::Archived);
        assert_eq!(memory.confidence, 0.0);
    }

    #[test]
    fn test_unreinforced_memory_archives_in_bounded_checks() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        let bound = (memory.confidence / config.decay_step).ceil() as usize;
        let mut checks = 0;
        while memory.stage != MemoryStage::Archived {
            memory = decay(&memory, &config, Utc::now()).unwrap();
            checks += 1;
            assert!(checks <= bound);
        }
        assert_eq!(checks, bound);
    }

    #[test]
    fn test_reinforcement_revives_decaying_to_mature() {
        let config = LifecycleConfig::default();
        let mut memory = draft();
        memory.stage = MemoryStage::Decaying;
        memory.confidence = 0.5;
        let next = reinforce(&memory, &config, Utc::now()).unwrap();
        assert_eq!(next.stage, MemoryStage::Mature);
        assert!(next.confidence > 0.5);
    }

    #[test]
    fn test_revise_links_lineage_and_resets_confidence() {
        let memory = draft();
        let (old, replacement) =
            revise(&memory, "opens stance under pressure", "", Utc::now()).unwrap();
        assert_eq!(old.stage, MemoryStage::Revised);
        assert_eq!(old.superseded_by.as_deref(), Some(replacement.id.as_str()));
        assert_eq!(replacement.stage, MemoryStage::Draft);
        assert_eq!(replacement.confidence, INITIAL_CONFIDENCE);
        assert!(replacement.detail.contains("Previously"));
    }

    #[test]
    fn test_terminal_stages_reject_everything() {
        let config = LifecycleConfig::default();
        for stage in [MemoryStage::Archived, MemoryStage::Revised] {
            let mut memory = draft();
            memory.stage = stage;
            assert!(matches!(
                reinforce(&memory, &config, Utc::now()),
                Err(EngineError::InvalidTransition { .. })
            ));
            assert!(matches!(
                decay(&memory, &config, Utc::now()),
                Err(EngineError::InvalidTransition { .. })
            ));
            assert!(matches!(
                revise(&memory, "x", "", Utc::now()),
                Err(EngineError::InvalidTransition { .. })
            ));
        }
    }
}
