//! Capture-side session lifecycle.
//!
//! Ties hotkey triggers, the voice-activity recorder, and dispatcher
//! replies together into one state machine per origin, tracking
//! cancellation, stale sessions, and the watchdog timeout.

pub mod coordinator;
pub mod sink;
pub mod state;

pub use coordinator::{CoordinatorMessage, SessionCoordinator};
pub use sink::{MemorySink, SendInputSink, TextSink, UserNotice};
pub use state::{SessionState, StateMachine};
