//! Audio capture and voice-activity recording for voxkey.
//!
//! The [`AudioCapture`] trait is the seam between the session logic and any
//! concrete audio stack; [`MockCapture`] drives tests without hardware, and
//! the `capture` feature adds a real cpal-backed microphone source.

pub mod analysis;
pub mod capture;
#[cfg(feature = "capture")]
pub mod cpal_capture;
pub mod recorder;

pub use analysis::{level_dbfs, SilenceTracker, TickVerdict};
pub use capture::{AudioCapture, MockCapture, CAPTURE_SAMPLE_RATE};
#[cfg(feature = "capture")]
pub use cpal_capture::{CaptureConfig, CpalCapture};
pub use recorder::{RecorderConfig, RecorderHandle, RecorderOutcome, VoiceActivityRecorder};
