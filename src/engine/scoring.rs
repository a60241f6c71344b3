// src/engine/scoring.rs
//! Deterministic priority adjustment.
//!
//! Rules run in declared order and are cumulative: each matching rule adds
//! its deltas on top of whatever earlier rules left behind. Active goal
//! adjustments are applied after all rules as a final additive layer. Every
//! applied delta is recorded as a signal string so the manifest can explain
//! the final score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::budget::Candidate;
use crate::engine::registry::{ConditionFn, FnRegistry};
use crate::engine::situation::Situation;
use crate::error::{EngineError, Result};
use crate::goals::{Goal, GoalStatus};

/// Serializable scoring rule definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRuleDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: ConditionDef,
    /// block key -> signed priority delta, applied when the condition holds.
    pub adjustments: BTreeMap<String, f64>,
}

/// Inspectable condition data. Variants are tried in declaration order
/// during deserialization, so the more specific shapes come first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionDef {
    /// Conjunction of sub-conditions.
    All { all: Vec<ConditionDef> },
    /// Escape hatch into the function registry.
    Named { named: String },
    /// Numeric threshold test on a flag.
    Threshold { flag: String, gte: f64 },
    /// Truthiness test on a flag.
    Flag { flag: String },
}

/// A rule with its condition resolved against the registry.
pub struct ScoringRule {
    pub def: ScoringRuleDef,
    condition: ResolvedCondition,
}

enum ResolvedCondition {
    All(Vec<ResolvedCondition>),
    Named(ConditionFn),
    Threshold { flag: String, gte: f64 },
    Flag(String),
}

impl ResolvedCondition {
    fn resolve(def: &ConditionDef, registry: &FnRegistry) -> Result<Self> {
        match def {
            ConditionDef::All { all } => Ok(ResolvedCondition::All(
                all.iter()
                    .map(|c| Self::resolve(c, registry))
                    .collect::<Result<Vec<_>>>()?,
            )),
            ConditionDef::Named { named } => registry
                .condition(named)
                .map(ResolvedCondition::Named)
                .ok_or_else(|| {
                    EngineError::Configuration(format!("unknown condition function: {named}"))
                }),
            ConditionDef::Threshold { flag, gte } => Ok(ResolvedCondition::Threshold {
                flag: flag.clone(),
                gte: *gte,
            }),
            ConditionDef::Flag { flag } => Ok(ResolvedCondition::Flag(flag.clone())),
        }
    }

    fn eval(&self, situation: &Situation) -> bool {
        match self {
            ResolvedCondition::All(subs) => subs.iter().all(|c| c.eval(situation)),
            ResolvedCondition::Named(f) => f(situation),
            ResolvedCondition::Threshold { flag, gte } => situation
                .flag_number(flag)
                .map(|v| v >= *gte)
                .unwrap_or(false),
            ResolvedCondition::Flag(flag) => situation.has_flag(flag),
        }
    }
}

impl ScoringRule {
    pub fn resolve(def: ScoringRuleDef, registry: &FnRegistry) -> Result<Self> {
        let condition = ResolvedCondition::resolve(&def.condition, registry)?;
        Ok(Self { def, condition })
    }

    pub fn matches(&self, situation: &Situation) -> bool {
        self.condition.eval(situation)
    }
}

/// Apply all rules in declared order to the scoreable candidates.
pub fn apply_rules(candidates: &mut [Candidate], rules: &[ScoringRule], situation: &Situation) {
    for rule in rules {
        if !rule.matches(situation) {
            continue;
        }
        for candidate in candidates.iter_mut() {
            if candidate.pre_excluded.is_some() {
                continue;
            }
            if let Some(delta) = rule.def.adjustments.get(&candidate.key) {
                if *delta != 0.0 {
                    candidate.score += delta;
                    candidate
                        .signals
                        .push(format!("rule:{}:{:+}", rule.def.name, delta));
                }
            }
        }
    }
}

/// Apply active goal adjustments as the final additive scoring layer.
pub fn apply_goal_adjustments(candidates: &mut [Candidate], goals: &[Goal]) {
    for goal in goals {
        if goal.status != GoalStatus::Active {
            continue;
        }
        for candidate in candidates.iter_mut() {
            if candidate.pre_excluded.is_some() {
                continue;
            }
            if let Some(delta) = goal.priority_adjustments.get(&candidate.key) {
                if *delta != 0.0 {
                    candidate.score += delta;
                    candidate
                        .signals
                        .push(format!("goal:{}:{:+}", goal.name, delta));
                }
            }
        }
    }
}
