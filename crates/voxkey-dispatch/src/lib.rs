//! Transcription dispatch context.
//!
//! Receives captured utterances as [`voxkey_core::protocol::DispatchRequest`]
//! messages, normalizes the audio for the model, runs inference through the
//! shared [`voxkey_model::ModelManager`], and answers with exactly one
//! terminal [`voxkey_core::protocol::DispatchReply`] per accepted request.

pub mod dispatcher;
pub mod normalize;

pub use dispatcher::TranscriptionDispatcher;
pub use normalize::{resample, trim_silence, MODEL_SAMPLE_RATE};
