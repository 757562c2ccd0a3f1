//! Shared error taxonomy for the scan/monitor pipeline.
//!
//! Components return a component-local error enum (see `probe::ProbeError`,
//! `history::HistoryError`, ...) and the orchestrator/scheduler boundary
//! aggregates them into `MonsterError`, tagged with an `ErrorKind` so the
//! scheduler can decide what's retryable without matching on every variant.

use std::fmt;

/// Error kind taxonomy (§7). Not an exhaustive error type itself -- just the
/// classification the scheduler and notifier act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    TransientNetwork,
    PermanentNetwork,
    Storage,
    Cancellation,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientNetwork)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonsterError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("permanent network error: {0}")]
    PermanentNetwork(String),
    #[error("storage error in {component}: {message}")]
    Storage { component: String, message: String },
    #[error("cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
}

impl MonsterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonsterError::Validation(_) => ErrorKind::Validation,
            MonsterError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            MonsterError::PermanentNetwork(_) => ErrorKind::PermanentNetwork,
            MonsterError::Storage { .. } => ErrorKind::Storage,
            MonsterError::Cancelled => ErrorKind::Cancellation,
            MonsterError::Config(_) => ErrorKind::Validation,
        }
    }

    pub fn storage(component: impl Into<String>, message: impl fmt::Display) -> Self {
        MonsterError::Storage {
            component: component.into(),
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for MonsterError {
    fn from(e: std::io::Error) -> Self {
        MonsterError::Storage {
            component: "io".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for MonsterError {
    fn from(e: serde_json::Error) -> Self {
        MonsterError::Storage {
            component: "serde_json".to_string(),
            message: e.to_string(),
        }
    }
}
