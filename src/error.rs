// src/error.rs
// Standardized error types for the assembly engine

use thiserror::Error;

/// Main error type for the tessera library.
///
/// The taxonomy mirrors the engine's failure boundaries: configuration
/// problems are fatal at startup, situation problems abort a single call
/// before anything is persisted, transition problems leave stored state
/// unchanged, and persistence problems carry the underlying store error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("situation error: {0}")]
    Situation(String),

    #[error("invalid transition: {entity} in {from} cannot {action}")]
    InvalidTransition {
        entity: String,
        from: String,
        action: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Result using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Shorthand for an invalid lifecycle transition.
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        EngineError::InvalidTransition {
            entity: entity.into(),
            from: from.into(),
            action: action.into(),
        }
    }

    /// True if this error means a call was rejected before any write happened.
    pub fn is_pre_persistence(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_) | EngineError::Situation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = EngineError::Configuration("duplicate block key: risk".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("duplicate block key"));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = EngineError::invalid_transition("memory", "archived", "reinforce");
        let msg = err.to_string();
        assert!(msg.contains("archived"));
        assert!(msg.contains("reinforce"));
    }

    #[test]
    fn test_pre_persistence_classification() {
        assert!(EngineError::Situation("bad flags".into()).is_pre_persistence());
        assert!(!EngineError::NotFound { kind: "goal", id: "x".into() }.is_pre_persistence());
    }
}
