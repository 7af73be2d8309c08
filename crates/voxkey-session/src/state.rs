//! Session state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for the dictation session lifecycle:
//! - Idle -> Recording (trigger start)
//! - Recording -> Processing (utterance handed to the dispatcher)
//! - Processing -> Idle (terminal reply delivered)
//! - Recording -> Idle (cancel, no speech, or discarded as noise)
//! - Processing -> Error (failure surfaced to the user)
//! - Error -> Recording / Idle (next trigger recovers)

use std::fmt;
use std::sync::{Arc, Mutex};

use voxkey_core::error::VoxError;

/// Lifecycle state of one origin's dictation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session in progress. Ready to start.
    Idle,
    /// Actively capturing microphone input.
    Recording,
    /// A transcription is in flight; waiting for the terminal reply.
    Processing,
    /// The last session failed; sticky until the next trigger.
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Processing => write!(f, "Processing"),
            SessionState::Error => write!(f, "Error"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Recording)
                | (SessionState::Recording, SessionState::Processing)
                | (SessionState::Processing, SessionState::Idle)
                | (SessionState::Processing, SessionState::Error)
                // Cancel / discard
                | (SessionState::Recording, SessionState::Idle)
                // Recovery from a surfaced failure
                | (SessionState::Error, SessionState::Recording)
                | (SessionState::Error, SessionState::Idle)
        )
    }
}

/// Thread-safe state machine for session state transitions.
///
/// All transitions are validated before being applied, returning an error
/// if the requested transition is not permitted.
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
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: SessionState) -> Result<(), VoxError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(VoxError::Session(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state machine back to Idle (watchdog and error recovery).
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        tracing::warn!("Session state machine reset to Idle from {}", *state);
        *state = SessionState::Idle;
    }
}
