use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{Device, ModelId, Provider};

/// Top-level configuration for voxkey.
///
/// Loaded from `~/.voxkey/config.toml` by default. The `overrides` table maps
/// a hostname to a partial settings record; present fields win over the
/// defaults when settings are resolved for that host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoxConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub dictation: DictationConfig,
    #[serde(default)]
    pub overrides: HashMap<String, SettingsOverride>,
}

impl VoxConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VoxConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Resolve the effective settings snapshot for a host.
    ///
    /// Merges the per-host override record (if any) over the defaults.
    /// Override fields win only when present. The snapshot is immutable per
    /// session and re-resolved at session start.
    pub fn effective_for(&self, host: &str) -> EffectiveSettings {
        let o = self.overrides.get(host);
        EffectiveSettings {
            model: o.and_then(|o| o.model).unwrap_or(self.model.model),
            provider: o.and_then(|o| o.provider).unwrap_or(self.model.provider),
            language: o
                .and_then(|o| o.language.clone())
                .unwrap_or_else(|| self.model.language.clone()),
            preferred_backend: self.model.preferred_backend,
            silence_timeout_ms: o
                .and_then(|o| o.silence_timeout_ms)
                .unwrap_or(self.dictation.silence_timeout_ms),
            no_speech_grace_ms: self.dictation.no_speech_grace_ms,
            hard_cap_enabled: o
                .and_then(|o| o.hard_cap_enabled)
                .unwrap_or(self.dictation.hard_cap_enabled),
            hard_cap_ms: o
                .and_then(|o| o.hard_cap_ms)
                .unwrap_or(self.dictation.hard_cap_ms),
            send_enter_after_result: o
                .and_then(|o| o.send_enter_after_result)
                .unwrap_or(self.dictation.send_enter_after_result),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Model selection defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Default model identifier (allow-listed; unknown values coerce).
    pub model: ModelId,
    /// Transcription provider.
    pub provider: Provider,
    /// Language code, or the sentinel "auto" for no language hint.
    pub language: String,
    /// Preferred compute backend; CPU is always the fallback.
    pub preferred_backend: Device,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: ModelId::DEFAULT,
            provider: Provider::Local,
            language: "auto".to_string(),
            preferred_backend: Device::Gpu,
        }
    }
}

/// Dictation timing and trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    /// Hotkey string (e.g., "F9", "Ctrl+Shift+D").
    pub hotkey: String,
    /// Silence duration after speech that completes an utterance.
    pub silence_timeout_ms: u64,
    /// Minimum grace period before giving up when no speech was ever heard.
    /// The effective wait is `max(no_speech_grace_ms, 2.5 * silence_timeout_ms)`.
    pub no_speech_grace_ms: u64,
    /// Whether to unconditionally stop recording after `hard_cap_ms`.
    pub hard_cap_enabled: bool,
    /// Unconditional maximum recording duration when the hard cap is on.
    pub hard_cap_ms: u64,
    /// Synthesize an Enter keystroke after inserting a result.
    pub send_enter_after_result: bool,
    /// Watchdog ceiling for an in-flight transcription.
    pub watchdog_ms: u64,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            hotkey: "F9".to_string(),
            silence_timeout_ms: 1500,
            no_speech_grace_ms: 2500,
            hard_cap_enabled: false,
            hard_cap_ms: 5000,
            send_enter_after_result: false,
            watchdog_ms: 22_000,
        }
    }
}

/// Partial per-host settings record. Present fields take precedence over the
/// defaults when resolving settings for that host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub model: Option<ModelId>,
    pub provider: Option<Provider>,
    pub language: Option<String>,
    pub silence_timeout_ms: Option<u64>,
    pub hard_cap_enabled: Option<bool>,
    pub hard_cap_ms: Option<u64>,
    pub send_enter_after_result: Option<bool>,
}

/// Immutable settings snapshot resolved for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub model: ModelId,
    pub provider: Provider,
    pub language: String,
    pub preferred_backend: Device,
    pub silence_timeout_ms: u64,
    pub no_speech_grace_ms: u64,
    pub hard_cap_enabled: bool,
    pub hard_cap_ms: u64,
    pub send_enter_after_result: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = VoxConfig::default();
        assert_eq!(config.model.model, ModelId::Base);
        assert_eq!(config.model.language, "auto");
        assert_eq!(config.dictation.silence_timeout_ms, 1500);
        assert_eq!(config.dictation.hard_cap_ms, 5000);
        assert!(!config.dictation.hard_cap_enabled);
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_effective_settings_no_override() {
        let config = VoxConfig::default();
        let settings = config.effective_for("example.com");
        assert_eq!(settings.model, ModelId::Base);
        assert_eq!(settings.silence_timeout_ms, 1500);
        assert!(!settings.send_enter_after_result);
    }

    #[test]
    fn test_effective_settings_override_precedence() {
        let mut config = VoxConfig::default();
        config.overrides.insert(
            "chat.example.com".to_string(),
            SettingsOverride {
                model: Some(ModelId::TinyEn),
                silence_timeout_ms: Some(800),
                send_enter_after_result: Some(true),
                ..Default::default()
            },
        );

        let settings = config.effective_for("chat.example.com");
        assert_eq!(settings.model, ModelId::TinyEn);
        assert_eq!(settings.silence_timeout_ms, 800);
        assert!(settings.send_enter_after_result);
        // Absent override fields fall back to defaults.
        assert_eq!(settings.language, "auto");
        assert!(!settings.hard_cap_enabled);

        // Other hosts are unaffected.
        let other = config.effective_for("other.example.com");
        assert_eq!(other.model, ModelId::Base);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = VoxConfig::default();
        config.dictation.hotkey = "Ctrl+Shift+D".to_string();
        config.overrides.insert(
            "docs.example.com".to_string(),
            SettingsOverride {
                language: Some("de".to_string()),
                ..Default::default()
            },
        );
        config.save(&path).unwrap();

        let loaded = VoxConfig::load(&path).unwrap();
        assert_eq!(loaded.dictation.hotkey, "Ctrl+Shift+D");
        assert_eq!(
            loaded.overrides["docs.example.com"].language.as_deref(),
            Some("de")
        );
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = VoxConfig::load_or_default(Path::new("/nonexistent/voxkey.toml"));
        assert_eq!(config.model.model, ModelId::Base);
    }

    #[test]
    fn test_unknown_model_in_toml_coerces() {
        let toml_src = r#"
            [model]
            model = "gigantic-v9"
        "#;
        let config: VoxConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.model.model, ModelId::DEFAULT);
    }
}
