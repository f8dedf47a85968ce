//! Runtime configuration.
//!
//! Loaded from YAML, with durations written the humantime way (`"8s"`,
//! `"200ms"`, `"1h"`). Every field has a default, so an empty document is a
//! valid configuration that runs the rules engine with no external services.
//!
//! ```yaml
//! engine: auto
//! adjudication_timeout: 8s
//! reasoning:
//!   provider: gemini
//!   model: gemini-1.5-flash
//! intent_service:
//!   url: https://intent.example.com/parse
//! circuit_breaker:
//!   failure_threshold: 3
//!   recovery_timeout: 30s
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use verba_core::EngineMode;

use crate::resilience::CircuitBreakerConfig;

/// Environment variable that overrides `engine`.
pub const ENGINE_ENV: &str = "JUDGE_ENGINE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Humantime (de)serialization for `Duration` fields.
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineMode,

    #[serde(with = "humantime_duration")]
    pub adjudication_timeout: Duration,

    #[serde(with = "humantime_duration")]
    pub intent_timeout: Duration,

    /// Pause between completing a stage and moving the cursor on.
    #[serde(with = "humantime_duration")]
    pub advance_delay: Duration,

    pub reasoning: ReasoningConfig,

    pub intent_service: IntentServiceConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineMode::Rules,
            adjudication_timeout: Duration::from_secs(8),
            intent_timeout: Duration::from_secs(8),
            advance_delay: Duration::from_millis(200),
            reasoning: ReasoningConfig::default(),
            intent_service: IntentServiceConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Defaults with the environment overlay applied.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `JUDGE_ENGINE`. An unknown value is logged and ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENGINE_ENV) {
            match raw.parse::<EngineMode>() {
                Ok(mode) => self.engine = mode,
                Err(reason) => {
                    tracing::warn!(value = %raw, %reason, "Ignoring {}", ENGINE_ENV);
                }
            }
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.adjudication_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "adjudication_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.intent_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "intent_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "circuit_breaker.failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// External reasoning backend.
///
/// `provider` picks the factory; every other key is passed to it as JSON.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub provider: String,

    #[serde(flatten)]
    pub options: BTreeMap<String, JsonValue>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl ReasoningConfig {
    /// Options as the JSON object a provider factory expects.
    pub fn provider_config(&self) -> JsonValue {
        JsonValue::Object(
            self.options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options: BTreeMap<&str, String> = self
            .options
            .iter()
            .map(|(k, v)| {
                let shown = if is_secret_key(k) {
                    "[REDACTED]".to_string()
                } else {
                    v.to_string()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("ReasoningConfig")
            .field("provider", &self.provider)
            .field("options", &options)
            .finish()
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("key") || key.contains("token") || key.contains("secret")
}

/// Live intent-parsing service. Unset fields fall back to
/// `INTENT_API_URL` and `INTENT_API_KEY`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl IntentServiceConfig {
    /// JSON view used by the credential loader.
    pub fn as_json(&self) -> JsonValue {
        serde_json::json!({
            "url": self.url,
            "api_key": self.api_key,
        })
    }
}

impl fmt::Debug for IntentServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentServiceConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Live-parse cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}
