// src/engine/situation.rs
//! Situation: the typed per-call diagnosis of "what is happening right now".
//!
//! A Situation is computed once per assembly call by the configured analyzer
//! and passed unchanged to every downstream stage. It is never persisted on
//! its own; the manifest carries a lossless serialized copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw per-category input data supplied by the caller, keyed by gatherer key.
pub type RawData = serde_json::Map<String, Value>;

/// Typed diagnosis derived from raw input for one assembly call.
///
/// Flags live in a BTreeMap so that serialization into the manifest is
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub entity_id: String,
    pub mode: String,
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,
    /// Optional analyzer-written narrative summarizing the diagnosis.
    #[serde(default)]
    pub narrative: String,
}

impl Situation {
    pub fn new() -> Self {
        Self {
            entity_id: String::new(),
            mode: String::new(),
            flags: BTreeMap::new(),
            narrative: String::new(),
        }
    }

    /// Build a situation directly from raw flags.
    pub fn from_flags(flags: BTreeMap<String, Value>) -> Self {
        Self {
            flags,
            ..Self::new()
        }
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.flags.insert(name.into(), value.into());
    }

    /// Truthiness test on a flag: false/0/""/[]/{}/null/missing are all false.
    pub fn has_flag(&self, name: &str) -> bool {
        match self.flags.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) | None => false,
        }
    }

    pub fn flag_value(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    /// Numeric view of a flag, if it holds a number.
    pub fn flag_number(&self, name: &str) -> Option<f64> {
        match self.flags.get(name) {
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }
}

impl Default for Situation {
    fn default() -> Self {
        Self::new()
    }
}

/// The default analyzer lifts the raw data map directly into flags.
///
/// Deployments with real diagnosis logic register their own analyzer
/// function and reference it by name in the engine configuration.
pub fn default_analyzer(raw: &RawData) -> crate::error::Result<Situation> {
    let flags = raw
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<BTreeMap<_, _>>();
    Ok(Situation::from_flags(flags))
}
