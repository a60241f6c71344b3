// src/config.rs
//! Engine configuration: a serializable document, loaded once, validated
//! against the function registry, then owned by the engine.
//!
//! There is no global config value. Runtime settings (database location)
//! come from the environment; everything that shapes an assembly (blocks,
//! rules, modes, lifecycle thresholds) lives in a TOML document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::block::{BlockDef, TierPriorities};
use crate::engine::scoring::ScoringRuleDef;
use crate::error::{EngineError, Result};
use crate::memory::LifecycleConfig;

/// Configuration for a specific operational mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Hard token ceiling for this mode.
    pub budget: usize,
    /// Subset of block keys active in this mode; empty means all.
    #[serde(default)]
    pub block_keys: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Full engine configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    /// Named analyzer from the function registry; `default` when absent.
    #[serde(default)]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub tier_priorities: TierPriorities,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    pub modes: BTreeMap<String, ModeConfig>,
    pub blocks: Vec<BlockDef>,
    #[serde(default)]
    pub rules: Vec<ScoringRuleDef>,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| EngineError::Configuration(format!("invalid engine config: {e}")))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    /// Seconds between background decay passes.
    pub decay_interval_secs: u64,
}

impl Settings {
    /// Load settings from the environment (reading `.env` if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: std::env::var("TESSERA_DATABASE_URL")
                .unwrap_or_else(|_| default_database_url()),
            max_connections: std::env::var("TESSERA_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            decay_interval_secs: std::env::var("TESSERA_DECAY_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7200),
        }
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera");
    std::fs::create_dir_all(&dir).ok();
    format!("sqlite://{}?mode=rwc", dir.join("tessera.db").display())
}
