//! Capture-control and reconciliation errors.

use spectate_core::SpectateError;
use thiserror::Error;

/// Failure reported by the capture-control API.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// A single request was rejected or could not be delivered.
    #[error("capture request {request} failed: {message}")]
    Request {
        /// Request name, e.g. `GetInputSettings`.
        request: String,
        /// Failure detail.
        message: String,
    },

    /// A batch was rejected; none of its operations took effect.
    #[error("capture batch failed: {message}")]
    BatchFailed {
        /// Failure detail.
        message: String,
    },
}

impl CaptureError {
    /// Shorthand for a [`CaptureError::Request`].
    pub fn request(request: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            request: request.into(),
            message: message.into(),
        }
    }
}

/// Errors from [`crate::ReconciliationEngine::assign`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The target uuid is not among the supplied capture sources.
    #[error("capture source {uuid} not found")]
    NotFound {
        /// Requested uuid.
        uuid: String,
    },

    /// The target's window title is not a playback window title.
    #[error("capture source {uuid} has unrecognized window title {window:?}")]
    InvalidTitle {
        /// Source uuid.
        uuid: String,
        /// Title as found.
        window: String,
    },

    /// Spectate request failed.
    #[error(transparent)]
    Spectate(#[from] SpectateError),

    /// Capture-control call failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl ReconcileError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidTitle { .. } => "invalid_title",
            Self::Spectate(e) => e.error_kind(),
            Self::Capture(_) => "capture_error",
        }
    }
}
