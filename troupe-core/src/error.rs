//! Error types for troupe operations

/// Result type for troupe operations
pub type Result<T> = std::result::Result<T, TroupeError>;

/// Error types for the troupe core
#[derive(Debug, thiserror::Error)]
pub enum TroupeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown agent identity
    #[error("Unknown agent identity: {0}")]
    UnknownIdentity(String),

    /// Queue channel error (rejected request, unexpected response)
    #[error("Channel error: {0}")]
    Channel(String),

    /// The other end of the queue channel went away
    #[error("Channel closed")]
    ChannelClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for TroupeError {
    fn from(s: String) -> Self {
        TroupeError::Other(s)
    }
}

impl From<&str> for TroupeError {
    fn from(s: &str) -> Self {
        TroupeError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for TroupeError {
    fn from(err: anyhow::Error) -> Self {
        TroupeError::Other(err.to_string())
    }
}
