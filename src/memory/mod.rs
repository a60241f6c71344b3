//! Persistent memory: the only entity state that survives across calls.
//!
//! - Types: stages, categories, the memory record itself
//! - Lifecycle: pure confidence/stage transitions
//! - Temporal: windowed trend metadata
//! - Store: SQLite persistence with compare-and-set mutation

pub mod lifecycle;
pub mod store;
pub mod temporal;
pub mod types;

pub use lifecycle::LifecycleConfig;
pub use store::{
    CreateMemoryInput, DecayCycleReport, MemoryStore, UpdateMemoryInput, spawn_decay_scheduler,
};
pub use temporal::{TemporalMetadata, TemporalWindows, Trend, compute_temporal};
pub use types::{INITIAL_CONFIDENCE, Memory, MemoryCategory, MemoryStage};
