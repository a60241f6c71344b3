// src/engine/mod.rs
//! The assembly engine: a deterministic pipeline over one call.
//!
//! `Gather → Analyze → Score → Select → Format → Manifest`. Each stage
//! consumes only the prior stage's output; nothing re-reads raw input after
//! gathering. The engine itself is immutable configuration, safe to share
//! across concurrent calls, and performs no I/O: fetching goals/memories
//! and persisting the manifest belong to the service layer.

pub mod block;
pub mod budget;
pub mod format;
pub mod manifest;
pub mod registry;
pub mod scoring;
pub mod situation;
pub mod tokens;

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{EngineConfig, ModeConfig};
use crate::engine::block::{BlockDef, Tier, TierPriorities};
use crate::engine::budget::Candidate;
use crate::engine::manifest::{BudgetUsage, ExcludeReason, Manifest, ManifestEntry};
use crate::engine::registry::{AnalyzerFn, FnRegistry, PredicateFn, RenderFn};
use crate::engine::scoring::ScoringRule;
use crate::engine::situation::RawData;
use crate::engine::tokens::TokenCounter;
use crate::error::{EngineError, Result};
use crate::goals::Goal;
use crate::memory::Memory;

/// Priority floor for injected memory blocks; confidence scales the rest.
const MEMORY_PRIORITY_BASE: f64 = 40.0;
const MEMORY_PRIORITY_SPAN: f64 = 40.0;

/// A block definition with its functions resolved against the registry.
struct ResolvedBlock {
    def: BlockDef,
    base_priority: f64,
    render: RenderFn,
    should_include: Option<PredicateFn>,
}

/// The configured engine. Built once from an [`EngineConfig`] and a
/// [`FnRegistry`]; every assembly call borrows it immutably.
pub struct Engine {
    name: String,
    blocks: Vec<ResolvedBlock>,
    modes: BTreeMap<String, ModeConfig>,
    rules: Vec<ScoringRule>,
    analyzer: AnalyzerFn,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("blocks", &self.blocks.len())
            .field("modes", &self.modes.keys().collect::<Vec<_>>())
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Validate configuration against the registry and build the engine.
    ///
    /// Fails with `Configuration` on duplicate block keys, a missing or
    /// unknown render function, an unknown predicate/condition/analyzer
    /// name, a zero budget, or a mode referencing an unknown block.
    pub fn new(config: EngineConfig, registry: &FnRegistry) -> Result<Self> {
        let mut blocks: Vec<ResolvedBlock> = Vec::with_capacity(config.blocks.len());
        for def in config.blocks {
            if blocks.iter().any(|b| b.def.key == def.key) {
                return Err(EngineError::Configuration(format!(
                    "duplicate block key: {}",
                    def.key
                )));
            }
            if def.render.is_empty() {
                return Err(EngineError::Configuration(format!(
                    "block {} has no render function",
                    def.key
                )));
            }
            let render = registry.renderer(&def.render).ok_or_else(|| {
                EngineError::Configuration(format!(
                    "block {} references unknown render function: {}",
                    def.key, def.render
                ))
            })?;
            let should_include = match &def.should_include {
                Some(name) => Some(registry.predicate(name).ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "block {} references unknown predicate: {}",
                        def.key, name
                    ))
                })?),
                None => None,
            };
            let base_priority = def.effective_priority(&config.tier_priorities);
            blocks.push(ResolvedBlock {
                def,
                base_priority,
                render,
                should_include,
            });
        }

        for (name, mode) in &config.modes {
            if mode.budget == 0 {
                return Err(EngineError::Configuration(format!(
                    "mode {name} has a zero token budget"
                )));
            }
            for key in &mode.block_keys {
                if !blocks.iter().any(|b| &b.def.key == key) {
                    return Err(EngineError::Configuration(format!(
                        "mode {name} references unknown block: {key}"
                    )));
                }
            }
        }

        let rules = config
            .rules
            .into_iter()
            .map(|def| ScoringRule::resolve(def, registry))
            .collect::<Result<Vec<_>>>()?;

        let analyzer_name = config.analyzer.as_deref().unwrap_or("default");
        let analyzer = registry.analyzer(analyzer_name).ok_or_else(|| {
            EngineError::Configuration(format!("unknown analyzer: {analyzer_name}"))
        })?;

        Ok(Self {
            name: config.name,
            blocks,
            modes: config.modes,
            rules,
            analyzer,
            token_counter: tokens::estimate_tokens,
        })
    }

    /// Swap the token counting function (defaults to the ~4 chars/token
    /// heuristic).
    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a block definition by key.
    pub fn resolve(&self, key: &str) -> Option<&BlockDef> {
        self.blocks.iter().find(|b| b.def.key == key).map(|b| &b.def)
    }

    pub fn mode(&self, name: &str) -> Option<&ModeConfig> {
        self.modes.get(name)
    }

    /// Run the full pipeline for one call. Pure and synchronous.
    ///
    /// Returns the assembled text plus the manifest explaining every
    /// inclusion and exclusion. Fails with `Configuration` for an unknown
    /// mode and `Situation` when the analyzer rejects the raw data; in both
    /// cases nothing has been computed that could be persisted.
    pub fn assemble(
        &self,
        entity_id: &str,
        mode: &str,
        raw: &RawData,
        goals: &[Goal],
        memories: &[Memory],
    ) -> Result<(String, Manifest)> {
        let mode_config = self
            .modes
            .get(mode)
            .ok_or_else(|| EngineError::Configuration(format!("unknown mode: {mode}")))?;

        // Analyze
        let mut situation = (self.analyzer)(raw)?;
        situation.entity_id = entity_id.to_string();
        situation.mode = mode.to_string();

        // Gather candidates in registry declaration order
        let mut candidates = self.build_candidates(raw, &situation, mode_config);

        // Score: rules in declared order, then active goal bias
        scoring::apply_rules(&mut candidates, &self.rules, &situation);
        scoring::apply_goal_adjustments(&mut candidates, goals);

        // Inject persistent memories as synthetic candidates
        let offset = self.blocks.len();
        candidates.extend(build_memory_candidates(memories, offset, self.token_counter));

        debug!(
            engine = %self.name,
            entity_id,
            mode,
            candidates = candidates.len(),
            "scoring complete, selecting within budget"
        );

        // Select within budget
        let selection = budget::select(candidates, mode_config.budget);

        // Format
        let assembled_text = format::format_selection(&selection);

        // Manifest
        let entries: Vec<ManifestEntry> = selection
            .entries
            .iter()
            .map(|entry| ManifestEntry {
                block_key: entry.candidate.key.clone(),
                category: entry.candidate.category.clone(),
                tier: entry.candidate.tier,
                base_priority: entry.candidate.base_priority,
                score: entry.candidate.score,
                size: entry.candidate.size,
                included: entry.included,
                reason: entry.reason,
                signals: entry.candidate.signals.clone(),
            })
            .collect();

        let included = entries.iter().filter(|e| e.included).count();
        let manifest = Manifest {
            entity_id: entity_id.to_string(),
            mode: mode.to_string(),
            situation,
            budget: BudgetUsage {
                mode: mode.to_string(),
                token_ceiling: mode_config.budget,
                used_tokens: selection.used_tokens,
                remaining_tokens: mode_config.budget as i64 - selection.used_tokens as i64,
                blocks_included: included,
                blocks_excluded: entries.len() - included,
            },
            total_considered: entries.len(),
            entries,
            assembled_text: assembled_text.clone(),
            over_floor_budget: selection.over_floor_budget,
        };

        Ok((assembled_text, manifest))
    }

    fn build_candidates(
        &self,
        raw: &RawData,
        situation: &situation::Situation,
        mode_config: &ModeConfig,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (position, block) in self.blocks.iter().enumerate() {
            if !mode_config.block_keys.is_empty()
                && !mode_config.block_keys.contains(&block.def.key)
            {
                continue;
            }

            let mut candidate = Candidate {
                key: block.def.key.clone(),
                category: block.def.category.clone(),
                tier: block.def.tier,
                base_priority: block.base_priority,
                score: block.base_priority,
                size: 0,
                text: String::new(),
                signals: Vec::new(),
                position,
                pre_excluded: None,
            };

            let Some(data) = raw.get(block.def.gatherer_key()) else {
                candidate.pre_excluded = Some(ExcludeReason::NoData);
                candidates.push(candidate);
                continue;
            };

            // The inclusion gate is only consulted below the always tier.
            if block.def.tier != Tier::Always {
                if let Some(gate) = &block.should_include {
                    if !gate(data, situation) {
                        candidate.pre_excluded = Some(ExcludeReason::NotApplicable);
                        candidates.push(candidate);
                        continue;
                    }
                }
            }

            candidate.text = (block.render)(data, situation);
            candidate.size = (self.token_counter)(&candidate.text);
            candidates.push(candidate);
        }
        candidates
    }
}

/// Turn non-terminal memories into candidates that compete for budget like
/// conditional blocks. Confidence maps linearly into a 40–80 priority band.
fn build_memory_candidates(
    memories: &[Memory],
    position_offset: usize,
    counter: TokenCounter,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (index, memory) in memories.iter().enumerate() {
        if memory.stage.is_terminal() {
            continue;
        }
        let mut text = format!("[Memory: {}] {}", memory.category.as_str(), memory.summary);
        if !memory.detail.is_empty() {
            text.push('\n');
            text.push_str(&memory.detail);
        }
        let priority = MEMORY_PRIORITY_BASE + memory.confidence * MEMORY_PRIORITY_SPAN;
        let size = counter(&text);
        candidates.push(Candidate {
            key: format!("memory:{}", memory.id),
            category: format!("memory.{}", memory.category.as_str()),
            tier: Tier::Conditional,
            base_priority: priority,
            score: priority,
            size,
            text,
            signals: vec![
                format!("confidence:{:.1}", memory.confidence),
                format!("stage:{}", memory.stage.as_str()),
            ],
            position: position_offset + index,
            pre_excluded: None,
        });
    }
    candidates
}
