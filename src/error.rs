//! Error types for the ANC manager

use thiserror::Error;

use crate::anc::{AncMode, AncState};

/// Result type alias for ANC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the ANC manager
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// ANC could not be initialised (microphone configuration or licensing)
    #[error("initialisation failed: {0}")]
    Initialisation(String),

    /// Event has no transition in the current state
    #[error("event '{event}' not handled in state {state}")]
    Rejected {
        /// Event name
        event: &'static str,
        /// State the machine was in
        state: AncState,
    },

    /// Requested mode is outside the configured mode set
    #[error("{mode} out of range ({num_modes} modes configured)")]
    ModeOutOfRange {
        /// Requested mode
        mode: AncMode,
        /// Number of configured modes
        num_modes: u8,
    },

    /// Audio subsystem reported a failure
    #[error("hardware error: {0}")]
    Hardware(String),

    /// Session persistence error
    #[error("persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is a dropped event rather than a real failure
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
