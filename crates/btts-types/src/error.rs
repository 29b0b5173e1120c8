//! Error types shared across btts crates.

use thiserror::Error;

/// Structural error kinds surfaced by the core.
#[derive(Debug, Error)]
pub enum BttsError {
    /// Configuration error (fatal for the subsystem that loads it)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied bad input; nothing was changed
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Chat, index or document missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate create; callers treat this as success
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network or store blip, retried at the next loop boundary
    #[error("Transient error: {0}")]
    Transient(String),

    /// Unrecoverable state (corrupt store, unusable settings)
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BttsError {
    /// Whether a retry at the next iteration may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BttsError::Transient(_))
    }
}
