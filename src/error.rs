//! # Engine Error Types
//!
//! Crate-wide error taxonomy for the release orchestration engine. Every
//! provider adapter and engine service returns [`EngineError`] so that the
//! executor and polling layers can classify outcomes uniformly: conflicts on
//! idempotent creates become successes, transient provider failures become
//! retryable task failures, and guard violations surface as conflicts rather
//! than silent overwrites.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced entity (release, task, branch, ref, integration) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional update lost, or an external ref already exists.
    /// For idempotent create operations this is treated as success.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The tenant has no credential configured for the target provider.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure or 5xx from a provider; eligible for manual retry.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Caller-supplied input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An illegal task or cycle state transition was attempted.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Engine configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// True when the error indicates the target already exists or the update
    /// lost a conditional-write race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when the failure is expected to clear on its own and a manual
    /// retry is sensible.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
