//! Error types for supervisor operations

use thiserror::Error;
use troupe_core::identity::AgentIdentity;

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error types for supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Failed to spawn agent {identity}: {source}")]
    Spawn {
        identity: AgentIdentity,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent {0} is already running")]
    AlreadyRunning(AgentIdentity),

    #[error("Failed to signal agent {identity}: {reason}")]
    Signal {
        identity: AgentIdentity,
        reason: String,
    },

    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] troupe_core::error::TroupeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
