//! Model lifecycle for voxkey: GPU capability probing, backend abstraction,
//! and the single shared model instance with load deduplication.

pub mod backend;
pub mod manager;
pub mod probe;
#[cfg(feature = "whisper")]
pub mod whisper;

pub use backend::{LoadedModel, MockBackend, ModelBackend, TranscribeOptions};
pub use manager::{EnsuredModel, ModelManager};
pub use probe::{Detection, GpuDetect, GpuProbe, StaticDetect, WgpuDetect};
#[cfg(feature = "whisper")]
pub use whisper::{WhisperBackend, WhisperModel};
