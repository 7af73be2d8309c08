use thiserror::Error;

/// Convenience alias used across all voxkey crates.
pub type Result<T> = std::result::Result<T, VoxError>;

/// Top-level error type for the voxkey system.
///
/// Each variant wraps a subsystem-specific failure as a message. Subsystem
/// crates construct the matching variant so that the `?` operator works
/// seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Hotkey error: {0}")]
    Hotkey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VoxError {
    fn from(err: toml::de::Error) -> Self {
        VoxError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VoxError {
    fn from(err: toml::ser::Error) -> Self {
        VoxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(err: serde_json::Error) -> Self {
        VoxError::Serialization(err.to_string())
    }
}
