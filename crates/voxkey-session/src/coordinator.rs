//! The session coordinator.
//!
//! One coordinator serves every origin, keyed by origin id. For each
//! origin it allocates strictly increasing session ids, drives the
//! recorder, hands finished utterances to the dispatcher, and applies
//! terminal replies. A reply or recorder outcome whose session id is not
//! the origin's newest one is dropped without effect; the watchdog bounds
//! how long the user can be left waiting for a reply that never comes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use voxkey_audio::{AudioCapture, RecorderConfig, RecorderHandle, RecorderOutcome,
    VoiceActivityRecorder, CAPTURE_SAMPLE_RATE};
use voxkey_core::config::VoxConfig;
use voxkey_core::pcm::encode_pcm16;
use voxkey_core::protocol::{CaptureEvent, DispatchReply, DispatchRequest, Trigger};
use voxkey_core::types::{IndicatorState, OriginId};

use crate::sink::{TextSink, UserNotice};
use crate::state::{SessionState, StateMachine};

/// Everything the coordinator reacts to besides recorder outcomes.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A trigger for one origin. `hostname` selects the settings override.
    Trigger {
        origin_id: OriginId,
        hostname: String,
        trigger: Trigger,
    },
    /// A terminal reply from the dispatch context.
    Reply(DispatchReply),
    /// Posted by a watchdog task that was never disarmed.
    WatchdogFired {
        origin_id: OriginId,
        session_id: u64,
    },
}

struct ActiveSession {
    session_id: u64,
    language: Option<String>,
    recorder: Option<RecorderHandle>,
    watchdog: Option<JoinHandle<()>>,
}

struct OriginEntry {
    last_id: u64,
    hostname: String,
    machine: StateMachine,
    active: Option<ActiveSession>,
}

impl OriginEntry {
    fn new(hostname: String) -> Self {
        Self {
            last_id: 0,
            hostname,
            machine: StateMachine::new(),
            active: None,
        }
    }
}

/// Owns the per-origin session registry and the recorder.
pub struct SessionCoordinator<C: AudioCapture + 'static, S: TextSink> {
    recorder: VoiceActivityRecorder<C>,
    sink: Arc<S>,
    config: Arc<VoxConfig>,
    request_tx: mpsc::Sender<DispatchRequest>,
    event_tx: mpsc::Sender<CaptureEvent>,
    // Watchdog tasks post back through here; `run` owns the receiver.
    self_tx: mpsc::Sender<CoordinatorMessage>,
    origins: HashMap<OriginId, OriginEntry>,
}

impl<C, S> SessionCoordinator<C, S>
where
    C: AudioCapture + 'static,
    S: TextSink,
{
    pub fn new(
        recorder: VoiceActivityRecorder<C>,
        sink: Arc<S>,
        config: Arc<VoxConfig>,
        request_tx: mpsc::Sender<DispatchRequest>,
        event_tx: mpsc::Sender<CaptureEvent>,
        self_tx: mpsc::Sender<CoordinatorMessage>,
    ) -> Self {
        Self {
            recorder,
            sink,
            config,
            request_tx,
            event_tx,
            self_tx,
            origins: HashMap::new(),
        }
    }

    /// Event pump. Ends when both inputs close.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<CoordinatorMessage>,
        mut outcomes: mpsc::Receiver<RecorderOutcome>,
    ) {
        loop {
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                outcome = outcomes.recv() => match outcome {
                    Some(outcome) => self.handle_outcome(outcome).await,
                    None => break,
                },
            }
        }
        info!("Session coordinator stopped");
    }

    pub async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Trigger {
                origin_id,
                hostname,
                trigger,
            } => match trigger {
                Trigger::StartRecording { language } => {
                    self.trigger_start(origin_id, hostname, language).await;
                }
                Trigger::StopRecording => self.trigger_stop(origin_id),
                Trigger::AbortRecording => self.trigger_abort(origin_id).await,
            },
            CoordinatorMessage::Reply(reply) => self.handle_reply(reply).await,
            CoordinatorMessage::WatchdogFired {
                origin_id,
                session_id,
            } => self.on_watchdog(origin_id, session_id).await,
        }
    }

    async fn trigger_start(
        &mut self,
        origin_id: OriginId,
        hostname: String,
        language: Option<String>,
    ) {
        let entry = self
            .origins
            .entry(origin_id)
            .or_insert_with(|| OriginEntry::new(hostname.clone()));
        entry.hostname = hostname;

        match entry.machine.current() {
            SessionState::Recording | SessionState::Processing => {
                debug!(
                    origin_id,
                    state = %entry.machine.current(),
                    "Ignoring start trigger while a session is outstanding"
                );
                return;
            }
            SessionState::Error => {
                // The next trigger recovers from a surfaced failure.
                entry.machine.reset();
            }
            SessionState::Idle => {}
        }

        let session_id = entry.last_id + 1;
        let settings = self.config.effective_for(&entry.hostname);
        let recorder_config = RecorderConfig::from_settings(&settings);

        let handle = match self.recorder.start(session_id, recorder_config).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(origin_id, session_id, error = %e, "Could not open audio capture");
                self.sink.notify(UserNotice::Failure(e.to_string()));
                return;
            }
        };

        entry.last_id = session_id;
        if entry.machine.transition(SessionState::Recording).is_err() {
            // Unreachable after the state check above; keep the session
            // identity consistent anyway.
            entry.machine.reset();
        }
        entry.active = Some(ActiveSession {
            session_id,
            language,
            recorder: Some(handle),
            watchdog: None,
        });
        info!(origin_id, session_id, "Session started");
        self.emit(CaptureEvent::RecordingState {
            state: IndicatorState::Recording,
        })
        .await;
    }

    fn trigger_stop(&mut self, origin_id: OriginId) {
        let Some(entry) = self.origins.get_mut(&origin_id) else {
            return;
        };
        if entry.machine.current() != SessionState::Recording {
            debug!(origin_id, "Ignoring stop trigger outside Recording");
            return;
        }
        if let Some(recorder) = entry.active.as_ref().and_then(|a| a.recorder.as_ref()) {
            recorder.stop();
        }
    }

    async fn trigger_abort(&mut self, origin_id: OriginId) {
        let Some(entry) = self.origins.get_mut(&origin_id) else {
            return;
        };
        match entry.machine.current() {
            SessionState::Recording => {
                info!(origin_id, "Aborting recording session");
                if let Some(recorder) = entry.active.as_ref().and_then(|a| a.recorder.as_ref()) {
                    recorder.abort();
                }
                let session_id = entry.last_id;
                // The recorder answers with a Canceled outcome; the state
                // transition happens there. The dispatcher never saw this
                // session, but disregarding it is harmless and also covers
                // a dispatch racing ahead of the abort.
                self.send_disregard(origin_id, session_id).await;
            }
            SessionState::Processing => {
                // Best-effort: in-flight inference is not interruptible,
                // so return to Idle locally and make sure its late reply
                // is never surfaced.
                info!(origin_id, "Abandoning in-flight transcription");
                let session_id = entry.last_id;
                if let Some(active) = entry.active.take() {
                    disarm(active.watchdog);
                }
                entry.machine.reset();
                self.send_disregard(origin_id, session_id).await;
                self.emit(CaptureEvent::ProcessingDone).await;
            }
            _ => debug!(origin_id, "Ignoring abort trigger while idle"),
        }
    }

    /// Apply one recorder outcome. The recording origin is found by its
    /// active session id; with one microphone there is at most one
    /// recording session process-wide.
    pub async fn handle_outcome(&mut self, outcome: RecorderOutcome) {
        let session_id = outcome.session_id();
        let Some(origin_id) = self.recording_origin(session_id) else {
            debug!(session_id, "Dropping outcome for unknown session");
            return;
        };

        self.emit(CaptureEvent::RecordingState {
            state: IndicatorState::Idle,
        })
        .await;

        let entry = self.origins.get_mut(&origin_id).expect("origin exists");
        match outcome {
            RecorderOutcome::Canceled { .. } => {
                debug!(origin_id, session_id, "Session canceled");
                entry.active = None;
                let _ = entry.machine.transition(SessionState::Idle);
            }
            RecorderOutcome::NoSpeech { .. } => {
                info!(origin_id, session_id, "No speech detected");
                entry.active = None;
                let _ = entry.machine.transition(SessionState::Idle);
                self.sink.notify(UserNotice::NoAudio);
            }
            RecorderOutcome::TooShort { .. } => {
                debug!(origin_id, session_id, "Utterance too short, discarded as noise");
                entry.active = None;
                let _ = entry.machine.transition(SessionState::Idle);
            }
            RecorderOutcome::Utterance { samples, .. } => {
                self.dispatch_utterance(origin_id, session_id, samples).await;
            }
        }
    }

    async fn dispatch_utterance(
        &mut self,
        origin_id: OriginId,
        session_id: u64,
        samples: Vec<f32>,
    ) {
        let watchdog_ms = self.config.dictation.watchdog_ms;
        let self_tx = self.self_tx.clone();
        let entry = self.origins.get_mut(&origin_id).expect("origin exists");

        if entry.machine.transition(SessionState::Processing).is_err() {
            debug!(origin_id, session_id, "Dropping utterance outside Recording");
            return;
        }

        let active = entry.active.as_mut().expect("active session exists");
        active.recorder = None;
        active.watchdog = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(watchdog_ms)).await;
            let _ = self_tx
                .send(CoordinatorMessage::WatchdogFired {
                    origin_id,
                    session_id,
                })
                .await;
        }));

        let request = DispatchRequest::TranscribeAudio {
            session_id,
            origin_id,
            audio: encode_pcm16(&samples),
            sample_rate: CAPTURE_SAMPLE_RATE,
            language: active.language.clone(),
            hostname: entry.hostname.clone(),
        };
        info!(
            origin_id,
            session_id,
            samples = samples.len(),
            "Dispatching utterance"
        );
        if self.request_tx.send(request).await.is_err() {
            warn!(origin_id, session_id, "Dispatch context is gone");
        }
    }

    /// Apply one terminal reply, or drop it as stale.
    pub async fn handle_reply(&mut self, reply: DispatchReply) {
        let Some((origin_id, session_id)) = reply.session() else {
            return;
        };
        let Some(entry) = self.origins.get_mut(&origin_id) else {
            debug!(origin_id, session_id, "Dropping reply for unknown origin");
            return;
        };

        let current = entry.active.as_ref().map(|a| a.session_id);
        if current != Some(session_id)
            || session_id != entry.last_id
            || entry.machine.current() != SessionState::Processing
        {
            debug!(origin_id, session_id, "Dropping stale reply");
            return;
        }

        let active = entry.active.take().expect("checked above");
        disarm(active.watchdog);

        let send_enter = self
            .config
            .effective_for(&entry.hostname)
            .send_enter_after_result;

        match reply {
            DispatchReply::Transcript { text, .. } => {
                info!(origin_id, session_id, chars = text.len(), "Delivering transcript");
                let _ = entry.machine.transition(SessionState::Idle);
                if let Err(e) = self.sink.insert_text(&text) {
                    warn!(origin_id, session_id, error = %e, "Text injection failed");
                    self.sink.notify(UserNotice::Failure(e.to_string()));
                } else if send_enter {
                    if let Err(e) = self.sink.press_enter() {
                        warn!(origin_id, session_id, error = %e, "Enter press failed");
                    }
                }
                self.emit(CaptureEvent::ProcessingDone).await;
            }
            DispatchReply::NoAudio { reason, .. } => {
                info!(origin_id, session_id, ?reason, "Nothing to transcribe");
                let _ = entry.machine.transition(SessionState::Idle);
                self.sink.notify(UserNotice::NoAudio);
                self.emit(CaptureEvent::ProcessingDone).await;
            }
            DispatchReply::Unintelligible { .. } => {
                info!(origin_id, session_id, "Unintelligible speech");
                let _ = entry.machine.transition(SessionState::Idle);
                self.sink.notify(UserNotice::Unintelligible);
                self.emit(CaptureEvent::UnintelligibleSpeech).await;
                self.emit(CaptureEvent::ProcessingDone).await;
            }
            DispatchReply::Failed { message, .. } => {
                warn!(origin_id, session_id, %message, "Transcription failed");
                let _ = entry.machine.transition(SessionState::Error);
                self.sink.notify(UserNotice::Failure(message));
                self.emit(CaptureEvent::ProcessingDone).await;
            }
            DispatchReply::Pong { .. } => {}
        }
    }

    /// The watchdog is a liveness bound for the user, not a cancellation
    /// of the computation; the late reply is disregarded instead.
    async fn on_watchdog(&mut self, origin_id: OriginId, session_id: u64) {
        let Some(entry) = self.origins.get_mut(&origin_id) else {
            return;
        };
        let current = entry.active.as_ref().map(|a| a.session_id);
        if current != Some(session_id) || entry.machine.current() != SessionState::Processing {
            debug!(origin_id, session_id, "Watchdog fired for a retired session");
            return;
        }

        warn!(origin_id, session_id, "Watchdog timeout, abandoning session");
        entry.active = None;
        entry.machine.reset();
        self.sink.notify(UserNotice::Timeout);
        self.send_disregard(origin_id, session_id).await;
        self.emit(CaptureEvent::ProcessingDone).await;
    }

    /// Current session state for one origin. Unknown origins are Idle.
    pub fn state_of(&self, origin_id: OriginId) -> SessionState {
        self.origins
            .get(&origin_id)
            .map(|e| e.machine.current())
            .unwrap_or(SessionState::Idle)
    }

    fn recording_origin(&self, session_id: u64) -> Option<OriginId> {
        self.origins.iter().find_map(|(origin_id, entry)| {
            let active = entry.active.as_ref()?;
            (active.session_id == session_id
                && entry.machine.current() == SessionState::Recording)
                .then_some(*origin_id)
        })
    }

    async fn send_disregard(&self, origin_id: OriginId, session_id: u64) {
        let request = DispatchRequest::Disregard {
            origin_id,
            session_id,
        };
        if self.request_tx.send(request).await.is_err() {
            warn!(origin_id, session_id, "Dispatch context is gone");
        }
    }

    async fn emit(&self, event: CaptureEvent) {
        // The host UI is optional; a closed event channel is not an error.
        let _ = self.event_tx.send(event).await;
    }
}

fn disarm(watchdog: Option<JoinHandle<()>>) {
    if let Some(task) = watchdog {
        task.abort();
    }
}
