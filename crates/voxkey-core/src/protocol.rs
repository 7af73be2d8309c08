//! Typed message contract between the capture context and the dispatch
//! context.
//!
//! Every cross-context interaction is a closed, serde-tagged enum so that
//! handling is exhaustive at compile time. No error is ever thrown across
//! this boundary; all failures travel as [`DispatchReply`] variants.

use serde::{Deserialize, Serialize};

use crate::types::{BackendProbe, Device, IndicatorState, ModelId, OriginId};

/// Capture-internal trigger messages that begin or end a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Begin a session. `language` optionally overrides the configured one.
    StartRecording { language: Option<String> },
    /// Graceful stop; the buffered utterance is dispatched if long enough.
    StopRecording,
    /// Cancel; the partial buffer is discarded.
    AbortRecording,
}

/// Events the capture side surfaces to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// Recording indicator update.
    RecordingState { state: IndicatorState },
    /// A transcription finished (any terminal outcome); resets the
    /// processing indicator.
    ProcessingDone,
    /// The model produced output that was classified as unusable.
    UnintelligibleSpeech,
}

/// Messages from the capture context to the dispatch context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchRequest {
    /// Submit a captured utterance for transcription.
    TranscribeAudio {
        session_id: u64,
        origin_id: OriginId,
        /// Mono 16-bit little-endian PCM at `sample_rate`.
        audio: Vec<u8>,
        sample_rate: u32,
        language: Option<String>,
        hostname: String,
    },
    /// Best-effort cancellation: any terminal reply for `session_id` or an
    /// earlier session of this origin must never be produced. In-flight
    /// inference is not interrupted; its late reply is suppressed instead.
    Disregard {
        origin_id: OriginId,
        session_id: u64,
    },
    /// Capability query.
    Ping,
}

/// Capability snapshot returned for a [`DispatchRequest::Ping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub preferred_backend: Device,
    pub active_backend: Option<Device>,
    pub active_model: Option<ModelId>,
    pub has_model_loaded: bool,
    pub probe: Option<BackendProbe>,
}

/// Terminal messages from the dispatch context back to the capture context.
///
/// Exactly one terminal reply is produced per accepted transcription
/// request; stale or duplicate requests produce none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchReply {
    /// Successful transcription.
    Transcript {
        origin_id: OriginId,
        session_id: u64,
        text: String,
    },
    /// The input contained nothing to transcribe. Not an error.
    NoAudio {
        origin_id: OriginId,
        session_id: u64,
        reason: Option<String>,
    },
    /// The model produced output, but it was classified as unusable.
    /// Not an error either, though it looks like one to the user.
    Unintelligible {
        origin_id: OriginId,
        session_id: u64,
    },
    /// Any failure during model ensure, decode, or inference.
    Failed {
        origin_id: OriginId,
        session_id: u64,
        message: String,
    },
    /// Answer to a capability query.
    Pong { status: ManagerStatus },
}

impl DispatchReply {
    /// The (origin, session) pair a terminal reply addresses, if any.
    pub fn session(&self) -> Option<(OriginId, u64)> {
        match self {
            DispatchReply::Transcript {
                origin_id,
                session_id,
                ..
            }
            | DispatchReply::NoAudio {
                origin_id,
                session_id,
                ..
            }
            | DispatchReply::Unintelligible {
                origin_id,
                session_id,
            }
            | DispatchReply::Failed {
                origin_id,
                session_id,
                ..
            } => Some((*origin_id, *session_id)),
            DispatchReply::Pong { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_serde_tagged() {
        let json = serde_json::to_string(&Trigger::StartRecording {
            language: Some("en".to_string()),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"start_recording\""));

        let back: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back,
            Trigger::StartRecording {
                language: Some("en".to_string())
            }
        );
    }

    #[test]
    fn test_transcribe_request_round_trip() {
        let req = DispatchRequest::TranscribeAudio {
            session_id: 7,
            origin_id: 3,
            audio: vec![1, 2, 3, 4],
            sample_rate: 48_000,
            language: None,
            hostname: "example.com".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: DispatchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_reply_session_accessor() {
        let reply = DispatchReply::NoAudio {
            origin_id: 1,
            session_id: 9,
            reason: Some("silence".to_string()),
        };
        assert_eq!(reply.session(), Some((1, 9)));

        let pong = DispatchReply::Pong {
            status: ManagerStatus {
                preferred_backend: Device::Gpu,
                active_backend: None,
                active_model: None,
                has_model_loaded: false,
                probe: None,
            },
        };
        assert_eq!(pong.session(), None);
    }

    #[test]
    fn test_pong_round_trip_with_probe() {
        use crate::types::BackendProbe;
        use chrono::Utc;

        let pong = DispatchReply::Pong {
            status: ManagerStatus {
                preferred_backend: Device::Gpu,
                active_backend: Some(Device::Cpu),
                active_model: Some(ModelId::Base),
                has_model_loaded: true,
                probe: Some(BackendProbe {
                    gpu_api_present: true,
                    adapter_acquired: true,
                    device_acquired: false,
                    error: Some("device lost".to_string()),
                    checked_at: Utc::now(),
                }),
            },
        };
        let json = serde_json::to_string(&pong).unwrap();
        let back: DispatchReply = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pong);
    }

    #[test]
    fn test_unknown_model_in_reply_payload_coerces() {
        // A status payload carrying an out-of-range model id deserializes to
        // the safe default rather than failing.
        let json = r#"{"type":"pong","status":{"preferred_backend":"cpu","active_backend":null,"active_model":"bogus","has_model_loaded":false,"probe":null}}"#;
        let reply: DispatchReply = serde_json::from_str(json).unwrap();
        match reply {
            DispatchReply::Pong { status } => {
                assert_eq!(status.active_model, Some(ModelId::DEFAULT));
            }
            _ => panic!("expected pong"),
        }
    }
}
