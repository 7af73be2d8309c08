use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for the tab/frame-equivalent context a session belongs to.
///
/// Sessions from different origins are fully independent; all per-session
/// ordering guarantees are scoped to one origin.
pub type OriginId = u64;

/// Compute substrate for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Gpu,
    Cpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Gpu => write!(f, "gpu"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Allow-listed transcription model identifiers.
///
/// Any identifier outside this enumeration is coerced to [`ModelId::DEFAULT`]
/// when parsed or deserialized, never rejected. The `*En` variants are
/// English-only models and force the language parameter to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelId {
    TinyEn,
    Tiny,
    BaseEn,
    Base,
    SmallEn,
    Small,
}

impl ModelId {
    /// Safe default used whenever an unknown identifier is encountered.
    pub const DEFAULT: ModelId = ModelId::Base;

    /// Canonical string form of the identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::TinyEn => "tiny.en",
            ModelId::Tiny => "tiny",
            ModelId::BaseEn => "base.en",
            ModelId::Base => "base",
            ModelId::SmallEn => "small.en",
            ModelId::Small => "small",
        }
    }

    /// Parse an identifier, coercing anything outside the allow-list to the
    /// safe default.
    pub fn parse(s: &str) -> ModelId {
        match s.trim() {
            "tiny.en" => ModelId::TinyEn,
            "tiny" => ModelId::Tiny,
            "base.en" => ModelId::BaseEn,
            "base" => ModelId::Base,
            "small.en" => ModelId::SmallEn,
            "small" => ModelId::Small,
            other => {
                if !other.is_empty() {
                    tracing::debug!(model = %other, "Unknown model id, using default");
                }
                ModelId::DEFAULT
            }
        }
    }

    /// English-only model variants ignore any configured language.
    pub fn is_english_only(&self) -> bool {
        matches!(self, ModelId::TinyEn | ModelId::BaseEn | ModelId::SmallEn)
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        ModelId::parse(&s)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.as_str().to_string()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow-listed transcription providers.
///
/// Out-of-range values coerce to the local provider rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    /// Locally-run speech model (the only provider this core drives).
    Local,
    /// Host-native speech service, handled outside this system.
    System,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::System => "system",
        }
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        match s.trim() {
            "system" => Provider::System,
            _ => Provider::Local,
        }
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.as_str().to_string()
    }
}

/// Result of a GPU capability probe.
///
/// Purely advisory: it informs backend candidate selection but never blocks
/// a load. All failures are captured into the record, the probe itself never
/// errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProbe {
    /// The GPU compute API surface is present at all.
    pub gpu_api_present: bool,
    /// An adapter was acquired.
    pub adapter_acquired: bool,
    /// A device was acquired from the adapter (and released again).
    pub device_acquired: bool,
    /// Captured error string from the first failing step, if any.
    pub error: Option<String>,
    /// When the probe last ran.
    pub checked_at: DateTime<Utc>,
}

impl BackendProbe {
    /// Whether the full detection sequence succeeded.
    pub fn usable(&self) -> bool {
        self.gpu_api_present && self.adapter_acquired && self.device_acquired
    }
}

/// Recording indicator state surfaced to the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    Recording,
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_parse_known() {
        assert_eq!(ModelId::parse("tiny.en"), ModelId::TinyEn);
        assert_eq!(ModelId::parse("small"), ModelId::Small);
        assert_eq!(ModelId::parse(" base "), ModelId::Base);
    }

    #[test]
    fn test_model_id_parse_unknown_coerces_to_default() {
        assert_eq!(ModelId::parse("large-v3"), ModelId::DEFAULT);
        assert_eq!(ModelId::parse(""), ModelId::DEFAULT);
        assert_eq!(ModelId::parse("../../etc/passwd"), ModelId::DEFAULT);
    }

    #[test]
    fn test_model_id_english_only() {
        assert!(ModelId::TinyEn.is_english_only());
        assert!(ModelId::BaseEn.is_english_only());
        assert!(!ModelId::Small.is_english_only());
    }

    #[test]
    fn test_model_id_serde_coercion() {
        let id: ModelId = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(id, ModelId::DEFAULT);

        let id: ModelId = serde_json::from_str("\"small.en\"").unwrap();
        assert_eq!(id, ModelId::SmallEn);

        let json = serde_json::to_string(&ModelId::TinyEn).unwrap();
        assert_eq!(json, "\"tiny.en\"");
    }

    #[test]
    fn test_provider_coercion() {
        let p: Provider = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(p, Provider::System);
        let p: Provider = serde_json::from_str("\"cloud\"").unwrap();
        assert_eq!(p, Provider::Local);
    }

    #[test]
    fn test_backend_probe_usable() {
        let probe = BackendProbe {
            gpu_api_present: true,
            adapter_acquired: true,
            device_acquired: true,
            error: None,
            checked_at: Utc::now(),
        };
        assert!(probe.usable());

        let probe = BackendProbe {
            device_acquired: false,
            ..probe
        };
        assert!(!probe.usable());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Gpu.to_string(), "gpu");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }
}
