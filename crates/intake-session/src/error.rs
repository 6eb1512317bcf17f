//! Error types for the session coordinator.

use intake_core::IntakeError;
use uuid::Uuid;

use crate::state::SessionState;

/// Errors from session lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session state transition: {0} -> {1}")]
    InvalidTransition(SessionState, SessionState),
    #[error("Session limit reached ({0} active)")]
    CapacityReached(usize),
    #[error("Session not found: {0}")]
    NotFound(Uuid),
    #[error("Session channel closed")]
    ChannelClosed,
    #[error("Image description failed: {0}")]
    ImageDescription(String),
    #[error(transparent)]
    Core(#[from] IntakeError),
}

impl From<SessionError> for IntakeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Core(inner) => inner,
            other => IntakeError::Session(other.to_string()),
        }
    }
}
