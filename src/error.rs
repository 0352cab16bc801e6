//! Error types for the meshcall orchestrator

use thiserror::Error;

/// Errors that can occur during peer orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local media capture failed (camera, microphone, or display)
    #[error("Media capture failed: {0}")]
    MediaAccess(String),

    /// The signaling transport is disconnected
    #[error("Signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// Reconnection attempts for a participant are exhausted
    #[error("Connectivity failed for participant {user_id}: reconnection attempts exhausted")]
    ConnectivityFailed {
        /// The participant whose connection could not be recovered
        user_id: String,
    },

    /// No connection is registered for the participant
    #[error("No connection registered for participant {0}")]
    PeerNotFound(String),

    /// Mesh capacity reached
    #[error("Peer limit of {0} reached")]
    PeerLimitExceeded(u32),

    /// SDP or ICE negotiation failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Underlying media transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for meshcall operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if error is recoverable by retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SignalingUnavailable(_) | Error::Transport(_) | Error::Io(_)
        )
    }

    /// Check if error came from local media capture
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::MediaAccess(_))
    }

    /// Check if error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if error relates to a specific peer's lifecycle
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectivityFailed { .. }
                | Error::PeerNotFound(_)
                | Error::PeerLimitExceeded(_)
                | Error::Negotiation(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
