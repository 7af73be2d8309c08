//! Real Whisper backend via whisper-rs (whisper.cpp bindings).
//!
//! Maps allow-listed model identifiers to GGML files in a model directory
//! and runs greedy, zero-temperature inference so output is reproducible.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use voxkey_core::error::{Result, VoxError};
use voxkey_core::types::{Device, ModelId};

use crate::backend::{LoadedModel, ModelBackend, TranscribeOptions};

/// Backend loading GGML whisper models from a local directory.
pub struct WhisperBackend {
    model_dir: PathBuf,
}

impl WhisperBackend {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    fn model_path(&self, model: ModelId) -> PathBuf {
        self.model_dir.join(format!("ggml-{}.bin", model.as_str()))
    }
}

impl ModelBackend for WhisperBackend {
    type Model = WhisperModel;

    async fn load(&self, model: ModelId, device: Device) -> Result<WhisperModel> {
        let path = self.model_path(model);
        if !Path::new(&path).exists() {
            return Err(VoxError::Model(format!(
                "whisper model file not found: {}",
                path.display()
            )));
        }

        info!(model = %model, device = %device, path = %path.display(), "Loading whisper model");

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(matches!(device, Device::Gpu));

        let path_str = path
            .to_str()
            .ok_or_else(|| VoxError::Model("model path is not valid UTF-8".to_string()))?;
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| VoxError::Model(format!("failed to load whisper model: {}", e)))?;

        Ok(WhisperModel { ctx })
    }
}

/// A loaded whisper.cpp context. The context owns its weights; dropping it
/// releases them, so `dispose` needs no extra work.
pub struct WhisperModel {
    ctx: WhisperContext,
}

impl LoadedModel for WhisperModel {
    async fn transcribe(&self, samples: &[f32], opts: &TranscribeOptions) -> Result<String> {
        if samples.is_empty() {
            return Err(VoxError::Transcription(
                "cannot transcribe empty audio".to_string(),
            ));
        }

        debug!(
            samples = samples.len(),
            language = ?opts.language,
            "Starting whisper inference"
        );

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| VoxError::Transcription(format!("failed to create state: {}", e)))?;

        // whisper.cpp segments audio internally in the fixed 30 s windows
        // that `opts.chunk_secs`/`stride_secs` describe; only language and
        // temperature are tunable through FullParams.
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(opts.language.as_deref());
        params.set_temperature(opts.temperature);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| VoxError::Transcription(format!("whisper inference failed: {}", e)))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| VoxError::Transcription(format!("failed to get segments: {}", e)))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                VoxError::Transcription(format!("failed to get segment {}: {}", i, e))
            })?;
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment.trim());
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_path_mapping() {
        let backend = WhisperBackend::new("/models");
        assert_eq!(
            backend.model_path(ModelId::TinyEn),
            PathBuf::from("/models/ggml-tiny.en.bin")
        );
        assert_eq!(
            backend.model_path(ModelId::Small),
            PathBuf::from("/models/ggml-small.bin")
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let backend = WhisperBackend::new("/nonexistent");
        let result = backend.load(ModelId::Base, Device::Cpu).await;
        assert!(result.is_err());
    }
}
