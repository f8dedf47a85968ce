//! Credential handling for external services.
//!
//! Reasoning keys and intent-service keys are wrapped in [`ApiCredential`]
//! as soon as they are read. After that point they cannot show up in
//! `Debug` or `Display` output and are zeroed on drop.
//!
//! ## Usage
//!
//! ```ignore
//! use verba_runtime::providers::secrets::ApiCredential;
//!
//! // Config first, then environment
//! let cred = ApiCredential::from_config_or_env(&config, "api_key", "GEMINI_API_KEY", "Gemini API key")?;
//!
//! // Expose only where the header is set
//! request.header("x-goog-api-key", cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A stored API credential. Debug and Display show `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from an environment variable. Empty values count as unset.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        read_env(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} not set: configure '{}' environment variable",
                    name, env_var
                ))
            })
    }

    /// Load from `config[config_key]`, falling back to `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config_str(config, config_key) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Some(value) = read_env(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Whether [`ApiCredential::from_config_or_env`] would succeed.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config_str(config, config_key).is_some() || read_env(env_var).is_some()
    }

    /// The raw value. Call only where the header is built; never store it.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn config_str<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config[key].as_str().filter(|v| !v.is_empty())
}

fn read_env(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

/// Loads several settings that share the config-then-environment lookup.
///
/// The intent service needs an endpoint and a key; both are resolved the
/// same way.
///
/// ```ignore
/// let creds = CredentialBuilder::new()
///     .require("url", "INTENT_API_URL", "Intent service URL")
///     .require("api_key", "INTENT_API_KEY", "Intent service key")
///     .build(&config)?;
/// ```
#[derive(Default)]
pub struct CredentialBuilder {
    required: Vec<CredentialSpec>,
    optional: Vec<CredentialSpec>,
}

struct CredentialSpec {
    config_key: &'static str,
    env_var: &'static str,
    name: &'static str,
}

impl CredentialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(
        mut self,
        config_key: &'static str,
        env_var: &'static str,
        name: &'static str,
    ) -> Self {
        self.required.push(CredentialSpec {
            config_key,
            env_var,
            name,
        });
        self
    }

    pub fn optional(
        mut self,
        config_key: &'static str,
        env_var: &'static str,
        name: &'static str,
    ) -> Self {
        self.optional.push(CredentialSpec {
            config_key,
            env_var,
            name,
        });
        self
    }

    /// Fails on the first missing required entry.
    pub fn build(self, config: &JsonValue) -> Result<CredentialSet, ProviderError> {
        let mut credentials = BTreeMap::new();

        for spec in self.required {
            let cred = ApiCredential::from_config_or_env(
                config,
                spec.config_key,
                spec.env_var,
                spec.name,
            )?;
            credentials.insert(spec.config_key, cred);
        }

        for spec in self.optional {
            if let Ok(cred) =
                ApiCredential::from_config_or_env(config, spec.config_key, spec.env_var, spec.name)
            {
                credentials.insert(spec.config_key, cred);
            }
        }

        Ok(CredentialSet { credentials })
    }
}

/// Loaded credentials keyed by config key.
pub struct CredentialSet {
    credentials: BTreeMap<&'static str, ApiCredential>,
}

impl CredentialSet {
    pub fn get(&self, key: &str) -> Result<&ApiCredential, ProviderError> {
        self.credentials.get(key).ok_or_else(|| {
            ProviderError::NotConfigured(format!("Credential '{}' not found", key))
        })
    }

    pub fn get_optional(&self, key: &str) -> Option<&ApiCredential> {
        self.credentials.get(key)
    }

    /// Move a credential out of the set.
    pub fn take(&mut self, key: &str) -> Result<ApiCredential, ProviderError> {
        self.credentials.remove(key).ok_or_else(|| {
            ProviderError::NotConfigured(format!("Credential '{}' not found", key))
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.credentials.contains_key(key)
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("keys", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted_in_debug() {
        let secret = "AIza-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "Gemini API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_redacted_in_display() {
        let secret = "AIza-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "Gemini API key");

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("[REDACTED]"));
        assert!(display.contains("Gemini API key"));
        assert!(display.contains("config"));
    }

    #[test]
    fn test_credential_expose() {
        let cred = ApiCredential::new("k-123", CredentialSource::Programmatic, "Test key");
        assert_eq!(cred.expose(), "k-123");
        assert!(!cred.is_empty());
    }

    #[test]
    fn test_from_config_or_env_prefers_config() {
        let config = serde_json::json!({ "api_key": "config-key" });

        std::env::set_var("VERBA_TEST_KEY_PRIORITY", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "VERBA_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);

        std::env::remove_var("VERBA_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_from_config_or_env_falls_back_to_env() {
        let config = serde_json::json!({ "api_key": "" });

        std::env::set_var("VERBA_TEST_KEY_FALLBACK", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "VERBA_TEST_KEY_FALLBACK",
            "Test key",
        )
        .unwrap();

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);

        std::env::remove_var("VERBA_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_from_config_or_env_error_when_missing() {
        let err = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "VERBA_NONEXISTENT_VAR_12345",
            "Test key",
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Test key"));
        assert!(msg.contains("api_key"));
        assert!(msg.contains("VERBA_NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_is_available() {
        let config = serde_json::json!({ "api_key": "value" });
        assert!(ApiCredential::is_available(&config, "api_key", "VERBA_NONEXISTENT"));
        assert!(!ApiCredential::is_available(
            &serde_json::json!({}),
            "api_key",
            "VERBA_NONEXISTENT"
        ));
    }

    #[test]
    fn test_credential_builder_for_intent_service() {
        let config = serde_json::json!({
            "url": "https://intent.example.com/parse",
            "api_key": "my-key"
        });

        let creds = CredentialBuilder::new()
            .require("url", "VERBA_TEST_URL", "Intent service URL")
            .require("api_key", "VERBA_TEST_KEY", "Intent service key")
            .optional("region", "VERBA_TEST_REGION", "Region")
            .build(&config)
            .unwrap();

        let mut creds = creds;
        assert!(creds.has("url"));
        assert!(!creds.has("region"));
        assert_eq!(creds.get("api_key").unwrap().expose(), "my-key");
        assert!(!format!("{:?}", creds).contains("my-key"));

        let key = creds.take("api_key").unwrap();
        assert_eq!(key.source(), CredentialSource::Config);
        assert!(!creds.has("api_key"));
    }

    #[test]
    fn test_credential_builder_missing_required() {
        let result = CredentialBuilder::new()
            .require("url", "VERBA_TEST_URL_MISSING", "Intent service URL")
            .build(&serde_json::json!({}));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }
}
