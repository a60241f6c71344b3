// src/engine/registry.rs
//! Named function registry backing block and rule configuration.
//!
//! Configuration files reference formatters, predicates, rule conditions and
//! the situation analyzer by name; the registry maps those names to
//! statically registered Rust functions. Unknown names fail engine
//! construction, never an assembly call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::situation::{RawData, Situation};
use crate::error::Result;

/// Pure formatter: (raw block data, situation) -> rendered text.
pub type RenderFn = Arc<dyn Fn(&Value, &Situation) -> String + Send + Sync>;

/// Pure inclusion gate: (raw block data, situation) -> candidate or not.
pub type PredicateFn = Arc<dyn Fn(&Value, &Situation) -> bool + Send + Sync>;

/// Pure scoring-rule condition over the situation.
pub type ConditionFn = Arc<dyn Fn(&Situation) -> bool + Send + Sync>;

/// Per-deployment situation analyzer: raw data -> typed diagnosis.
pub type AnalyzerFn = Arc<dyn Fn(&RawData) -> Result<Situation> + Send + Sync>;

/// Lookup table of named pure functions available to configuration.
pub struct FnRegistry {
    renderers: HashMap<String, RenderFn>,
    predicates: HashMap<String, PredicateFn>,
    conditions: HashMap<String, ConditionFn>,
    analyzers: HashMap<String, AnalyzerFn>,
}

impl FnRegistry {
    /// Empty registry. Most callers want [`FnRegistry::with_builtins`].
    pub fn new() -> Self {
        Self {
            renderers: HashMap::new(),
            predicates: HashMap::new(),
            conditions: HashMap::new(),
            analyzers: HashMap::new(),
        }
    }

    /// Registry preloaded with the generic data-driven builtins:
    ///
    /// - renderers: `default`, `bullet_list`, `key_values`
    /// - predicates: `non_empty`
    /// - analyzers: `default`
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register_renderer("default", |data, _| render_default(data));
        reg.register_renderer("bullet_list", |data, _| render_bullet_list(data));
        reg.register_renderer("key_values", |data, _| render_key_values(data));
        reg.register_predicate("non_empty", |data, _| is_non_empty(data));
        reg.register_analyzer("default", crate::engine::situation::default_analyzer);
        reg
    }

    pub fn register_renderer(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &Situation) -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.renderers.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_predicate(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &Situation) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.predicates.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_condition(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Situation) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.conditions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_analyzer(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&RawData) -> Result<Situation> + Send + Sync + 'static,
    ) -> &mut Self {
        self.analyzers.insert(name.into(), Arc::new(f));
        self
    }

    pub fn renderer(&self, name: &str) -> Option<RenderFn> {
        self.renderers.get(name).cloned()
    }

    pub fn predicate(&self, name: &str) -> Option<PredicateFn> {
        self.predicates.get(name).cloned()
    }

    pub fn condition(&self, name: &str) -> Option<ConditionFn> {
        self.conditions.get(name).cloned()
    }

    pub fn analyzer(&self, name: &str) -> Option<AnalyzerFn> {
        self.analyzers.get(name).cloned()
    }
}

impl Default for FnRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Builtin formatters and predicates
// ============================================================================

fn render_default(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

fn render_bullet_list(data: &Value) -> String {
    match data {
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", render_default(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_default(other),
    }
}

fn render_key_values(data: &Value) -> String {
    match data {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, render_default(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_default(other),
    }
}

fn is_non_empty(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
