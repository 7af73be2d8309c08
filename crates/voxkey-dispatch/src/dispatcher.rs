//! The transcription dispatcher.
//!
//! One dispatcher serves every origin. Per origin, concurrency is strictly
//! serialized at one in-flight transcription, and session ids only move
//! forward; requests at or behind the last-seen id are dropped without a
//! reply. Across origins, requests proceed concurrently and meet only at
//! the model manager's load critical section.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use voxkey_core::config::{EffectiveSettings, VoxConfig};
use voxkey_core::pcm::decode_pcm16;
use voxkey_core::protocol::{DispatchReply, DispatchRequest};
use voxkey_core::types::{ModelId, OriginId};
use voxkey_model::{GpuDetect, LoadedModel, ModelBackend, ModelManager, TranscribeOptions};

use crate::normalize::{has_enough_speech, resample, trim_silence, MODEL_SAMPLE_RATE};

/// Model output fragments that mean "no intelligible speech". Matching is
/// case-insensitive over the whole returned text.
const BLANK_MARKERS: &[&str] = &[
    "[blank_audio]",
    "[blank audio]",
    "[silence]",
    "(silence)",
    "[inaudible]",
    "[music]",
    "[no speech]",
];

#[derive(Default)]
struct OriginGate {
    last_seen: u64,
    // Highest explicitly disregarded id; replies at or below it are
    // suppressed even when the pipeline already ran.
    disregarded: u64,
    in_flight: bool,
}

/// Serves transcription requests against the shared model manager.
pub struct TranscriptionDispatcher<B: ModelBackend, D> {
    manager: Arc<ModelManager<B, D>>,
    config: Arc<VoxConfig>,
    gates: Mutex<HashMap<OriginId, OriginGate>>,
}

impl<B, D> TranscriptionDispatcher<B, D>
where
    B: ModelBackend,
    D: GpuDetect,
{
    pub fn new(manager: Arc<ModelManager<B, D>>, config: Arc<VoxConfig>) -> Self {
        Self {
            manager,
            config,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one request. Returns `None` only for dropped (stale,
    /// duplicate, superseded, or disregarded) transcription requests;
    /// every accepted request produces exactly one terminal reply.
    pub async fn handle(&self, request: DispatchRequest) -> Option<DispatchReply> {
        match request {
            DispatchRequest::Ping => Some(DispatchReply::Pong {
                status: self.manager.status().await,
            }),
            DispatchRequest::Disregard {
                origin_id,
                session_id,
            } => {
                self.disregard(origin_id, session_id).await;
                None
            }
            DispatchRequest::TranscribeAudio {
                session_id,
                origin_id,
                audio,
                sample_rate,
                language,
                hostname,
            } => {
                self.transcribe(session_id, origin_id, audio, sample_rate, language, &hostname)
                    .await
            }
        }
    }

    /// Advance the origin's last-seen id so that no terminal reply for
    /// `session_id` or any earlier session can be produced.
    async fn disregard(&self, origin_id: OriginId, session_id: u64) {
        let mut gates = self.gates.lock().await;
        let gate = gates.entry(origin_id).or_default();
        if session_id > gate.disregarded {
            debug!(origin_id, session_id, "Disregarding session");
            gate.disregarded = session_id;
        }
        if session_id > gate.last_seen {
            gate.last_seen = session_id;
        }
    }

    async fn transcribe(
        &self,
        session_id: u64,
        origin_id: OriginId,
        audio: Vec<u8>,
        sample_rate: u32,
        language: Option<String>,
        hostname: &str,
    ) -> Option<DispatchReply> {
        {
            let mut gates = self.gates.lock().await;
            let gate = gates.entry(origin_id).or_default();
            if session_id <= gate.last_seen {
                debug!(origin_id, session_id, "Dropping stale transcription request");
                return None;
            }
            if gate.in_flight {
                debug!(origin_id, session_id, "Dropping request while one is in flight");
                return None;
            }
            gate.last_seen = session_id;
            gate.in_flight = true;
        }

        let settings = self.config.effective_for(hostname);
        let result = self
            .run_pipeline(session_id, origin_id, &audio, sample_rate, language, &settings)
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(origin_id, session_id, error = %e, "Transcription failed");
                DispatchReply::Failed {
                    origin_id,
                    session_id,
                    message: e.to_string(),
                }
            }
        };

        let mut gates = self.gates.lock().await;
        let gate = gates.entry(origin_id).or_default();
        gate.in_flight = false;
        // A disregard that arrived mid-flight suppresses the late reply.
        if session_id <= gate.disregarded {
            debug!(origin_id, session_id, "Suppressing reply for disregarded session");
            return None;
        }
        Some(reply)
    }

    async fn run_pipeline(
        &self,
        session_id: u64,
        origin_id: OriginId,
        audio: &[u8],
        sample_rate: u32,
        language: Option<String>,
        settings: &EffectiveSettings,
    ) -> voxkey_core::Result<DispatchReply> {
        let ensured = self.manager.ensure_model(settings.model).await?;

        let samples = decode_pcm16(audio);
        let samples = resample(&samples, sample_rate, MODEL_SAMPLE_RATE);
        let trimmed = trim_silence(&samples);

        if !has_enough_speech(trimmed, MODEL_SAMPLE_RATE) {
            info!(origin_id, session_id, "Nothing but silence after trimming");
            return Ok(DispatchReply::NoAudio {
                origin_id,
                session_id,
                reason: Some("silence".to_string()),
            });
        }

        let effective_language = language.unwrap_or_else(|| settings.language.clone());
        let opts = TranscribeOptions {
            language: language_hint(ensured.model, &effective_language),
            ..TranscribeOptions::default()
        };

        let text = ensured.instance.transcribe(trimmed, &opts).await?;
        let text = text.trim().to_string();

        if is_blank(&text) {
            info!(origin_id, session_id, "Model output classified as unintelligible");
            return Ok(DispatchReply::Unintelligible {
                origin_id,
                session_id,
            });
        }

        info!(
            origin_id,
            session_id,
            model = %ensured.model,
            device = %ensured.device,
            chars = text.len(),
            "Transcription complete"
        );
        Ok(DispatchReply::Transcript {
            origin_id,
            session_id,
            text,
        })
    }
}

/// English-only model variants always transcribe English; the `"auto"`
/// sentinel means no hint at all.
fn language_hint(model: ModelId, language: &str) -> Option<String> {
    if model.is_english_only() {
        Some("en".to_string())
    } else if language == "auto" {
        None
    } else {
        Some(language.to_string())
    }
}

/// Empty, whitespace-only, or blank-marker output carries no usable speech.
fn is_blank(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let lowered = text.to_lowercase();
    BLANK_MARKERS.iter().any(|marker| lowered.contains(marker))
}
