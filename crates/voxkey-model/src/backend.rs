//! Capability traits for model loading and inference, plus a scriptable
//! mock backend for testing the manager and dispatcher without any ML
//! runtime.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use voxkey_core::error::{Result, VoxError};
use voxkey_core::types::{Device, ModelId};

/// Inference parameters. The chunking values are fixed by the dispatcher so
/// that output is deterministic and reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    /// Language hint. `None` lets the model auto-detect.
    pub language: Option<String>,
    /// Audio chunk length in seconds.
    pub chunk_secs: u32,
    /// Overlap between consecutive chunks in seconds.
    pub stride_secs: u32,
    /// Sampling temperature; zero for greedy, reproducible decoding.
    pub temperature: f32,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            chunk_secs: 30,
            stride_secs: 5,
            temperature: 0.0,
        }
    }
}

/// A loaded, ready-to-infer model instance.
pub trait LoadedModel: Send + Sync {
    /// Run inference over mono f32 samples at the model's sample rate.
    fn transcribe(
        &self,
        samples: &[f32],
        opts: &TranscribeOptions,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Release underlying resources. Best-effort: never errors and is safe
    /// to call more than once.
    fn dispose(&self) {}
}

/// Capability seam for loading models onto a compute device.
///
/// A failed `load` must leave no partial state behind; the manager moves on
/// to the next device candidate without further cleanup.
pub trait ModelBackend: Send + Sync {
    type Model: LoadedModel;

    fn load(
        &self,
        model: ModelId,
        device: Device,
    ) -> impl Future<Output = Result<Self::Model>> + Send;
}

// =============================================================================
// Mock implementation
// =============================================================================

#[derive(Debug, Default)]
struct MockScript {
    reply: String,
    transcribe_error: Option<String>,
    hold: Option<Arc<Semaphore>>,
}

/// Mock backend that records every load and can be scripted to fail on
/// specific (model, device) pairs or during transcription.
pub struct MockBackend {
    loads: Mutex<Vec<(ModelId, Device)>>,
    failures: Mutex<HashSet<(ModelId, Device)>>,
    script: Arc<Mutex<MockScript>>,
    disposed: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            loads: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
            script: Arc::new(Mutex::new(MockScript {
                reply: "[mock transcription]".to_string(),
                transcribe_error: None,
                hold: None,
            })),
            disposed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script a load failure for one (model, device) pair.
    pub fn fail_on(&self, model: ModelId, device: Device) {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .insert((model, device));
    }

    /// Set the text every transcription returns.
    pub fn set_reply(&self, text: &str) {
        self.script.lock().expect("script mutex poisoned").reply = text.to_string();
    }

    /// Gate every transcription on a zero-permit semaphore so a caller can
    /// hold one open mid-inference; release with `add_permits(1)`.
    pub fn hold_transcriptions(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.script.lock().expect("script mutex poisoned").hold = Some(Arc::clone(&gate));
        gate
    }

    /// Make every transcription fail with the given message.
    pub fn fail_transcription(&self, message: &str) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .transcribe_error = Some(message.to_string());
    }

    /// All loads performed so far, in order.
    pub fn loads(&self) -> Vec<(ModelId, Device)> {
        self.loads.lock().expect("loads mutex poisoned").clone()
    }

    /// Number of loads performed for one model, across devices.
    pub fn load_count(&self, model: ModelId) -> usize {
        self.loads()
            .iter()
            .filter(|(m, _)| *m == model)
            .count()
    }

    /// Number of dispose calls observed across all handed-out models.
    pub fn disposed_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl ModelBackend for MockBackend {
    type Model = MockModel;

    async fn load(&self, model: ModelId, device: Device) -> Result<MockModel> {
        self.loads
            .lock()
            .expect("loads mutex poisoned")
            .push((model, device));

        let failing = self
            .failures
            .lock()
            .expect("failures mutex poisoned")
            .contains(&(model, device));
        if failing {
            return Err(VoxError::Model(format!(
                "scripted load failure for {} on {}",
                model, device
            )));
        }

        Ok(MockModel {
            model,
            device,
            script: Arc::clone(&self.script),
            disposed: Arc::clone(&self.disposed),
        })
    }
}

/// Model handed out by [`MockBackend`].
#[derive(Debug)]
pub struct MockModel {
    pub model: ModelId,
    pub device: Device,
    script: Arc<Mutex<MockScript>>,
    disposed: Arc<AtomicUsize>,
}

impl LoadedModel for MockModel {
    async fn transcribe(&self, samples: &[f32], _opts: &TranscribeOptions) -> Result<String> {
        if samples.is_empty() {
            return Err(VoxError::Transcription(
                "cannot transcribe empty audio".to_string(),
            ));
        }
        // Take the gate out of the lock before parking on it.
        let hold = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .hold
            .clone();
        if let Some(gate) = hold {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let script = self.script.lock().expect("script mutex poisoned");
        if let Some(msg) = &script.transcribe_error {
            return Err(VoxError::Transcription(msg.clone()));
        }
        Ok(script.reply.clone())
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}
