use serde::{Deserialize, Serialize};

/// Errors surfaced by collaborators, classified for reconcile decisions.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EtherealError {
    #[error("not_found: {0}")]
    NotFound(String),
    /// Optimistic-concurrency failure; retried with a fresh read next cycle.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Control plane unreachable or misbehaving.
    #[error("transient: {0}")]
    Transient(String),
    /// Object rejected at the adapter boundary.
    #[error("invalid: {0}")]
    Invalid(String),
    /// No usable control-plane connection at startup.
    #[error("fatal_config: {0}")]
    FatalConfig(String),
}

impl EtherealError {
    pub fn kind(&self) -> &'static str {
        match self {
            EtherealError::NotFound(_) => "not_found",
            EtherealError::Conflict(_) => "conflict",
            EtherealError::Transient(_) => "transient",
            EtherealError::Invalid(_) => "invalid",
            EtherealError::FatalConfig(_) => "fatal_config",
        }
    }
}

pub type EtherealResult<T> = Result<T, EtherealError>;
