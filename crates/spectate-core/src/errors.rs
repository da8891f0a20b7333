//! Error taxonomy for the spectate control client.

use thiserror::Error;

/// Errors surfaced by spectate client operations.
///
/// Connection loss is not represented as its own variant: callers waiting on a
/// response when the socket drops receive [`SpectateError::NotConnected`],
/// everyone else learns about it through the close notification.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SpectateError {
    /// The socket could not be opened or the handshake did not complete.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// Endpoint we tried to reach.
        endpoint: String,
        /// What went wrong.
        reason: String,
    },

    /// The operation needs a live session and there is none.
    #[error("not connected to spectate remote control")]
    NotConnected,

    /// No correlated response arrived before the deadline.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },

    /// The server explicitly reported a failure.
    #[error("spectate remote control error: {0}")]
    RemoteError(String),

    /// A frame did not have the expected shape.
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

impl SpectateError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ConnectFailed { .. } => "connect_failed",
            Self::NotConnected => "not_connected",
            Self::Timeout { .. } => "timeout",
            Self::RemoteError(_) => "remote_error",
            Self::ProtocolError(_) => "protocol_error",
        }
    }

    /// Shorthand for a [`SpectateError::ProtocolError`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }
}

impl From<serde_json::Error> for SpectateError {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolError(err.to_string())
    }
}

/// Result type for spectate client operations.
pub type Result<T> = std::result::Result<T, SpectateError>;
