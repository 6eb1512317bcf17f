//! Session state machine with validated transitions.
//!
//! - Created -> Configuring (client started the session)
//! - Configuring -> Listening (speech channel acknowledged configuration)
//! - Listening <-> Speaking (assistant audio starts / finishes or is cut off)
//! - any open state -> Closing (stop, disconnect, channel error, timeout)
//! - Closing -> Closed

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SessionError;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Channel accepted, nothing configured yet.
    Created,
    /// Configuration sent, waiting for the acknowledgement.
    Configuring,
    /// Active, no assistant audio playing.
    Listening,
    /// Active, assistant audio playing.
    Speaking,
    /// Shutting down; waiting for any in-flight turn.
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "Created"),
            SessionState::Configuring => write!(f, "Configuring"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Speaking => write!(f, "Speaking"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Created, SessionState::Configuring)
                | (SessionState::Configuring, SessionState::Listening)
                | (SessionState::Listening, SessionState::Speaking)
                | (SessionState::Speaking, SessionState::Listening)
                | (SessionState::Closing, SessionState::Closed)
                // Shutdown
                | (SessionState::Created, SessionState::Closing)
                | (SessionState::Configuring, SessionState::Closing)
                | (SessionState::Listening, SessionState::Closing)
                | (SessionState::Speaking, SessionState::Closing)
        )
    }

    /// Accepting utterances.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Listening | SessionState::Speaking)
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

/// Shared, validated session state. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<SessionState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Created)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> SessionState {
        *self.lock()
    }

    pub fn transition(&self, target: SessionState) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(SessionError::InvalidTransition(*state, target))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
