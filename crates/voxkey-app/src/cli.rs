//! CLI argument definitions for the voxkey binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Voxkey: hotkey dictation into the focused application via a local
/// speech model.
#[derive(Parser, Debug)]
#[command(name = "voxkey", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Directory holding the ggml model files.
    #[arg(short = 'm', long = "model-dir")]
    pub model_dir: Option<PathBuf>,

    /// Write the effective configuration back to the config file and exit.
    #[arg(long = "write-config")]
    pub write_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VOXKEY_CONFIG env var > platform default
    /// (~/.voxkey/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VOXKEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the model directory.
    ///
    /// Priority: --model-dir flag > VOXKEY_MODEL_DIR env var > ./models.
    pub fn resolve_model_dir(&self) -> PathBuf {
        if let Some(ref p) = self.model_dir {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VOXKEY_MODEL_DIR") {
            return PathBuf::from(p);
        }
        PathBuf::from("models")
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".voxkey").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".voxkey").join("config.toml");
    }
    PathBuf::from("config.toml")
}
