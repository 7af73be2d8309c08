//! Voice-activity recorder.
//!
//! Owns one recording session at a time: pulls frames from an
//! [`AudioCapture`], feeds per-tick levels into a [`SilenceTracker`], and
//! reports a single [`RecorderOutcome`] when the session ends, whether by
//! silence detection, explicit stop, abort, or the hard cap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use voxkey_core::config::EffectiveSettings;
use voxkey_core::error::Result;

use crate::analysis::{
    level_dbfs, SilenceTracker, TickVerdict, MIN_UTTERANCE, SILENT_LEVEL_DB, TICK_INTERVAL,
};
use crate::capture::{AudioCapture, CAPTURE_SAMPLE_RATE};

/// Timing parameters for one recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub silence_timeout: Duration,
    pub no_speech_grace: Duration,
    pub hard_cap: Option<Duration>,
}

impl RecorderConfig {
    pub fn from_settings(settings: &EffectiveSettings) -> Self {
        Self {
            silence_timeout: Duration::from_millis(settings.silence_timeout_ms),
            no_speech_grace: Duration::from_millis(settings.no_speech_grace_ms),
            hard_cap: settings
                .hard_cap_enabled
                .then(|| Duration::from_millis(settings.hard_cap_ms)),
        }
    }
}

/// How a recording session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderOutcome {
    /// Speech was captured; `samples` are mono f32 at [`CAPTURE_SAMPLE_RATE`].
    Utterance { session_id: u64, samples: Vec<f32> },
    /// No speech was ever detected.
    NoSpeech { session_id: u64 },
    /// Captured audio was too short to be a deliberate utterance.
    TooShort { session_id: u64 },
    /// The session was aborted; nothing downstream should run.
    Canceled { session_id: u64 },
}

impl RecorderOutcome {
    pub fn session_id(&self) -> u64 {
        match self {
            Self::Utterance { session_id, .. }
            | Self::NoSpeech { session_id }
            | Self::TooShort { session_id }
            | Self::Canceled { session_id } => *session_id,
        }
    }
}

enum RecorderCommand {
    Stop,
    Abort,
}

/// Control handle for an in-flight recording session.
///
/// The handle is a keep-alive: dropping it cancels the session, so the
/// holder of the handle owns the session's lifetime.
pub struct RecorderHandle {
    cmd_tx: mpsc::Sender<RecorderCommand>,
}

impl RecorderHandle {
    /// Finish the session now and deliver whatever was captured.
    pub fn stop(&self) {
        let _ = self.cmd_tx.try_send(RecorderCommand::Stop);
    }

    /// Cancel the session; the outcome will be [`RecorderOutcome::Canceled`].
    pub fn abort(&self) {
        let _ = self.cmd_tx.try_send(RecorderCommand::Abort);
    }
}

/// Runs recording sessions against a capture backend, delivering outcomes
/// on a channel so sessions survive independently of their initiator.
pub struct VoiceActivityRecorder<C: AudioCapture + 'static> {
    capture: Arc<C>,
    outcome_tx: mpsc::Sender<RecorderOutcome>,
}

impl<C: AudioCapture + 'static> VoiceActivityRecorder<C> {
    pub fn new(capture: Arc<C>, outcome_tx: mpsc::Sender<RecorderOutcome>) -> Self {
        Self {
            capture,
            outcome_tx,
        }
    }

    /// Start a recording session. Fails if the capture device cannot be
    /// opened; once `Ok` is returned the outcome arrives on the channel.
    pub async fn start(&self, session_id: u64, config: RecorderConfig) -> Result<RecorderHandle> {
        let frames = self.capture.start().await?;
        tracing::info!(session_id, "Recording session started");

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let capture = Arc::clone(&self.capture);
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = run_session(session_id, config, frames, cmd_rx).await;
            if let Err(err) = capture.stop().await {
                tracing::warn!(session_id, %err, "Failed to stop capture");
            }
            tracing::info!(session_id, outcome = discriminant_name(&outcome), "Recording session ended");
            if outcome_tx.send(outcome).await.is_err() {
                tracing::warn!(session_id, "Recorder outcome receiver dropped");
            }
        });

        Ok(RecorderHandle { cmd_tx })
    }
}

fn discriminant_name(outcome: &RecorderOutcome) -> &'static str {
    match outcome {
        RecorderOutcome::Utterance { .. } => "utterance",
        RecorderOutcome::NoSpeech { .. } => "no_speech",
        RecorderOutcome::TooShort { .. } => "too_short",
        RecorderOutcome::Canceled { .. } => "canceled",
    }
}

async fn run_session(
    session_id: u64,
    config: RecorderConfig,
    mut frames: mpsc::Receiver<Vec<f32>>,
    mut commands: mpsc::Receiver<RecorderCommand>,
) -> RecorderOutcome {
    let mut tracker = SilenceTracker::new(
        config.silence_timeout,
        config.no_speech_grace,
        config.hard_cap,
        now(),
    );
    let mut buffer: Vec<f32> = Vec::new();
    let mut window: Vec<f32> = Vec::new();
    let mut frames_open = true;

    let mut ticks = tokio::time::interval(TICK_INTERVAL);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.reset();

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(RecorderCommand::Stop) => break,
                    // A dropped handle cancels the session too.
                    Some(RecorderCommand::Abort) | None => {
                        return RecorderOutcome::Canceled { session_id };
                    }
                }
            }
            frame = frames.recv(), if frames_open => {
                match frame {
                    Some(frame) => {
                        window.extend_from_slice(&frame);
                        buffer.extend(frame);
                    }
                    // Device failure closes the stream; finish with what
                    // was captured so far.
                    None => frames_open = false,
                }
            }
            _ = ticks.tick() => {
                let level = if window.is_empty() {
                    SILENT_LEVEL_DB
                } else {
                    level_dbfs(&window)
                };
                window.clear();
                match tracker.tick(level, now()) {
                    TickVerdict::Continue => {}
                    TickVerdict::NoSpeech => {
                        return RecorderOutcome::NoSpeech { session_id };
                    }
                    TickVerdict::UtteranceComplete | TickVerdict::HardCap => break,
                }
            }
        }
    }

    if !tracker.ever_heard() && buffer_duration(&buffer) < MIN_UTTERANCE {
        return RecorderOutcome::NoSpeech { session_id };
    }
    if buffer_duration(&buffer) < MIN_UTTERANCE {
        return RecorderOutcome::TooShort { session_id };
    }
    RecorderOutcome::Utterance {
        session_id,
        samples: buffer,
    }
}

// Reads the tokio clock so paused-clock tests control session timing.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn buffer_duration(buffer: &[f32]) -> Duration {
    Duration::from_secs_f64(buffer.len() as f64 / f64::from(CAPTURE_SAMPLE_RATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCapture;

    fn test_config() -> RecorderConfig {
        RecorderConfig {
            silence_timeout: Duration::from_millis(1500),
            no_speech_grace: Duration::from_millis(2500),
            hard_cap: None,
        }
    }

    /// One 120 ms frame of mono samples at constant amplitude.
    fn tick_frame(amplitude: f32) -> Vec<f32> {
        vec![amplitude; CAPTURE_SAMPLE_RATE as usize * 120 / 1000]
    }

    async fn recorder_with_channel(
        capture: Arc<MockCapture>,
    ) -> (VoiceActivityRecorder<MockCapture>, mpsc::Receiver<RecorderOutcome>) {
        let (tx, rx) = mpsc::channel(4);
        (VoiceActivityRecorder::new(capture, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_then_silence_yields_utterance() {
        let capture = Arc::new(MockCapture::new());
        // ~480 ms of loud speech queued up front; silence after.
        capture.push_frames(vec![tick_frame(0.5); 4]);
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let _handle = recorder.start(7, test_config()).await.unwrap();

        let outcome = outcomes.recv().await.unwrap();
        match outcome {
            RecorderOutcome::Utterance { session_id, samples } => {
                assert_eq!(session_id, 7);
                assert!(buffer_duration(&samples) >= MIN_UTTERANCE);
            }
            other => panic!("expected utterance, got {:?}", other),
        }
        assert!(!capture.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_only_yields_no_speech() {
        let capture = Arc::new(MockCapture::new());
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let _handle = recorder.start(1, test_config()).await.unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, RecorderOutcome::NoSpeech { session_id: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_cancels_session() {
        let capture = Arc::new(MockCapture::new());
        capture.push_frames(vec![tick_frame(0.5); 4]);
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        drop(recorder.start(2, test_config()).await.unwrap());

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, RecorderOutcome::Canceled { session_id: 2 });
        assert!(!capture.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_yields_canceled() {
        let capture = Arc::new(MockCapture::new());
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let handle = recorder.start(3, test_config()).await.unwrap();
        handle.abort();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, RecorderOutcome::Canceled { session_id: 3 });
        assert!(!capture.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_only_noise_yields_no_speech() {
        let capture = Arc::new(MockCapture::new());
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let handle = recorder.start(4, test_config()).await.unwrap();
        handle.stop();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, RecorderOutcome::NoSpeech { session_id: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_brief_speech_yields_too_short() {
        let capture = Arc::new(MockCapture::new());
        // One loud frame (~120 ms): heard, but under the minimum utterance.
        capture.push_frames(vec![tick_frame(0.5)]);
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let handle = recorder.start(5, test_config()).await.unwrap();
        // Let the tick loop observe the loud frame before stopping.
        tokio::time::sleep(TICK_INTERVAL * 2).await;
        handle.stop();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, RecorderOutcome::TooShort { session_id: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_mid_session_finishes_with_buffer() {
        let capture = Arc::new(MockCapture::new());
        capture.push_frames(vec![tick_frame(0.5); 4]);
        let (recorder, mut outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        let _handle = recorder.start(8, test_config()).await.unwrap();
        // Closing the stream simulates a device failure; the tick loop
        // still runs the silence logic over what was buffered.
        tokio::time::sleep(TICK_INTERVAL).await;
        capture.stop().await.unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, RecorderOutcome::Utterance { session_id: 8, .. }));
    }

    #[tokio::test]
    async fn test_start_fails_when_device_unavailable() {
        let capture = Arc::new(MockCapture::new());
        capture.fail_next_start();
        let (recorder, _outcomes) = recorder_with_channel(Arc::clone(&capture)).await;

        assert!(recorder.start(9, test_config()).await.is_err());
        assert!(!capture.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_from_settings_disabled_cap() {
        let settings = EffectiveSettings {
            model: voxkey_core::ModelId::DEFAULT,
            provider: voxkey_core::Provider::Local,
            language: "auto".to_string(),
            preferred_backend: voxkey_core::Device::Gpu,
            silence_timeout_ms: 1500,
            no_speech_grace_ms: 2500,
            hard_cap_enabled: false,
            hard_cap_ms: 5000,
            send_enter_after_result: false,
        };
        let config = RecorderConfig::from_settings(&settings);
        assert_eq!(config.hard_cap, None);
        assert_eq!(config.silence_timeout, Duration::from_millis(1500));
    }
}
