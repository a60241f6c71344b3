// src/lib.rs

pub mod config;
pub mod decisions;
pub mod engine;
pub mod error;
pub mod goals;
pub mod memory;
pub mod service;
pub mod storage;

pub use config::{EngineConfig, ModeConfig, Settings};
pub use engine::Engine;
pub use engine::manifest::Manifest;
pub use engine::registry::FnRegistry;
pub use engine::situation::{RawData, Situation};
pub use error::{EngineError, Result};
pub use service::{AssembleOutput, ContextService};
