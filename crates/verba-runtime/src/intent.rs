//! Live intent parsing with deterministic fallback.
//!
//! [`IntentParser::parse`] never fails. It tries the configured
//! [`IntentService`] once, bounded by the intent timeout, and substitutes
//! the [`FallbackParser`] result on any problem:
//!
//! - no service configured (logged at `debug`)
//! - circuit open, timeout, transport, status or decode error (logged at `warn`)
//!
//! Successful live parses are cached by intent digest and language hint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use thiserror::Error;
use verba_core::intent::{normalize, Currency, Extraction, IntentParty, Money, PartyRole};
use verba_core::{
    FallbackParser, Language, ParseClock, ParseMode, ParseResult, ParsedIntent, SystemClock,
};

use crate::cache::{ParseCache, ParseKey};
use crate::config::RuntimeConfig;
use crate::resilience::{CircuitBreaker, ServiceKind};

/// Environment fallback for the intent service endpoint.
pub const INTENT_API_URL_ENV: &str = "INTENT_API_URL";

/// Environment fallback for the intent service key.
pub const INTENT_API_KEY_ENV: &str = "INTENT_API_KEY";

const DEFAULT_LIVE_CONFIDENCE: f64 = 0.8;

#[derive(Error, Debug)]
pub enum IntentServiceError {
    #[error("intent service not configured: {0}")]
    NotConfigured(String),

    #[error("intent service request failed: {0}")]
    Http(String),

    #[error("intent service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("intent service response could not be decoded: {0}")]
    Decode(String),

    #[error("intent service timed out after {0:?}")]
    Timeout(Duration),
}

/// An external service that turns testimony into a [`ParsedIntent`].
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn parse(
        &self,
        text: &str,
        hint: Option<Language>,
    ) -> Result<ParsedIntent, IntentServiceError>;

    fn name(&self) -> &str;
}

/// Wire shape of a live parse. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveIntentResponse {
    pub normalized_text: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
    pub parties: Vec<LiveParty>,
    pub amount: Option<LiveAmount>,
    #[serde(rename = "deadlineISO")]
    pub deadline_iso: Option<String>,
    pub duration_hours: Option<f64>,
    pub conditions: Vec<String>,
    pub confidence: Option<f64>,
    pub extraction: Option<LiveExtraction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveParty {
    pub name: Option<String>,
    pub address: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveAmount {
    pub value: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveExtraction {
    pub amount_source: Option<String>,
    pub deadline_source: Option<String>,
    pub party_source: Option<String>,
}

impl LiveIntentResponse {
    /// Map onto [`ParsedIntent`], filling the documented defaults.
    ///
    /// Language falls back to the hint and then `en`; roles default to
    /// CLIENT, currency to INR, confidence to 0.8. An unparseable deadline is
    /// dropped rather than failing the parse.
    pub fn into_intent(self, text: &str, hint: Option<Language>) -> ParsedIntent {
        let language = self
            .language
            .as_deref()
            .filter(|code| !code.is_empty())
            .map(Language::from_code)
            .or(hint)
            .unwrap_or(Language::En);

        let parties = self
            .parties
            .into_iter()
            .map(|p| IntentParty {
                name: p.name,
                address: p.address,
                role: match p.role.as_deref().map(str::to_uppercase).as_deref() {
                    Some("PROVIDER") => PartyRole::Provider,
                    _ => PartyRole::Client,
                },
            })
            .collect();

        let amount = self.amount.and_then(|a| {
            let value = a.value?;
            let currency = match a.currency.as_deref().map(str::to_uppercase).as_deref() {
                Some("ETH") => Currency::Eth,
                Some("SHM") => Currency::Shm,
                _ => Currency::Inr,
            };
            Some(Money { value, currency })
        });

        let deadline = self
            .deadline_iso
            .as_deref()
            .and_then(|raw| DateTime::<FixedOffset>::parse_from_rfc3339(raw).ok());

        let extraction = self
            .extraction
            .map(|e| Extraction {
                amount_source: e.amount_source,
                deadline_source: e.deadline_source,
                party_source: e.party_source,
            })
            .unwrap_or_default();

        ParsedIntent {
            raw_text: text.to_string(),
            normalized_text: self
                .normalized_text
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| normalize(text)),
            language,
            task: self.task,
            parties,
            amount,
            deadline,
            duration_hours: self.duration_hours,
            conditions: self.conditions,
            confidence: self
                .confidence
                .filter(|c| *c > 0.0)
                .unwrap_or(DEFAULT_LIVE_CONFIDENCE),
            extraction,
        }
    }
}

#[cfg(feature = "http")]
pub use http::HttpIntentService;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::config::IntentServiceConfig;
    use crate::providers::{ApiCredential, CredentialBuilder};

    /// JSON-over-HTTP intent service with bearer authentication.
    pub struct HttpIntentService {
        url: String,
        credential: ApiCredential,
        client: reqwest::Client,
    }

    impl std::fmt::Debug for HttpIntentService {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpIntentService")
                .field("url", &self.url)
                .field("credential", &self.credential)
                .finish()
        }
    }

    impl HttpIntentService {
        pub fn new(url: impl Into<String>, credential: ApiCredential) -> Self {
            Self {
                url: url.into(),
                credential,
                client: reqwest::Client::new(),
            }
        }

        /// Endpoint and key from config, falling back to `INTENT_API_URL`
        /// and `INTENT_API_KEY`. Both are required.
        pub fn from_config(config: &IntentServiceConfig) -> Result<Self, IntentServiceError> {
            let mut creds = CredentialBuilder::new()
                .require("url", INTENT_API_URL_ENV, "Intent service URL")
                .require("api_key", INTENT_API_KEY_ENV, "Intent service key")
                .build(&config.as_json())
                .map_err(|e| IntentServiceError::NotConfigured(e.to_string()))?;
            let url = creds
                .get("url")
                .map_err(|e| IntentServiceError::NotConfigured(e.to_string()))?
                .expose()
                .to_string();
            let credential = creds
                .take("api_key")
                .map_err(|e| IntentServiceError::NotConfigured(e.to_string()))?;
            Ok(Self::new(url, credential))
        }

        pub fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait]
    impl IntentService for HttpIntentService {
        async fn parse(
            &self,
            text: &str,
            hint: Option<Language>,
        ) -> Result<ParsedIntent, IntentServiceError> {
            let body = serde_json::json!({
                "text": text,
                "lang": hint.map(|l| l.code()).unwrap_or("en"),
            });

            let response = self
                .client
                .post(&self.url)
                .bearer_auth(self.credential.expose())
                .json(&body)
                .send()
                .await
                .map_err(|e| IntentServiceError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(IntentServiceError::Status {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }

            let live: LiveIntentResponse = response
                .json()
                .await
                .map_err(|e| IntentServiceError::Decode(e.to_string()))?;

            Ok(live.into_intent(text, hint))
        }

        fn name(&self) -> &str {
            "http"
        }
    }
}

/// Intent parsing entry point for case sessions.
pub struct IntentParser<C = SystemClock> {
    service: Option<Arc<dyn IntentService>>,
    fallback: FallbackParser<C>,
    timeout: Duration,
    circuit_breaker: Arc<CircuitBreaker>,
    cache: ParseCache,
}

impl IntentParser<SystemClock> {
    /// Fallback-only parser.
    pub fn fallback_only() -> Self {
        Self::with_parts(
            None,
            FallbackParser::new(),
            Duration::from_secs(8),
            Arc::new(CircuitBreaker::default()),
            ParseCache::default(),
        )
    }

    /// Build from runtime config. A missing or incomplete service
    /// configuration leaves the parser on the fallback path.
    pub fn from_config(config: &RuntimeConfig, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self::with_parts(
            configured_service(config),
            FallbackParser::new(),
            config.intent_timeout,
            circuit_breaker,
            ParseCache::from_config(&config.cache),
        )
    }
}

#[cfg(feature = "http")]
fn configured_service(config: &RuntimeConfig) -> Option<Arc<dyn IntentService>> {
    match HttpIntentService::from_config(&config.intent_service) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::debug!(reason = %e, "Live intent parsing disabled");
            None
        }
    }
}

#[cfg(not(feature = "http"))]
fn configured_service(_config: &RuntimeConfig) -> Option<Arc<dyn IntentService>> {
    tracing::debug!("Live intent parsing disabled: built without the http feature");
    None
}

impl<C: ParseClock> IntentParser<C> {
    pub fn with_parts(
        service: Option<Arc<dyn IntentService>>,
        fallback: FallbackParser<C>,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
        cache: ParseCache,
    ) -> Self {
        Self {
            service,
            fallback,
            timeout,
            circuit_breaker,
            cache,
        }
    }

    pub fn has_live_service(&self) -> bool {
        self.service.is_some()
    }

    /// Parse testimony. Always returns a result tagged with its path.
    pub async fn parse(&self, text: &str, hint: Option<Language>) -> ParseResult {
        let Some(service) = &self.service else {
            tracing::debug!("No intent service configured, using fallback parser");
            return self.fallback(text, hint);
        };

        let key = ParseKey::new(text, hint);
        if let Some(mut intent) = self.cache.get(&key).await {
            tracing::debug!(digest = %key.digest(), "Live parse served from cache");
            // The key ignores whitespace layout; keep the caller's own text.
            intent.raw_text = text.to_string();
            return ParseResult {
                mode: ParseMode::Live,
                intent,
            };
        }

        if self.circuit_breaker.is_open(ServiceKind::IntentParsing) {
            tracing::warn!("Intent service circuit open, using fallback parser");
            return self.fallback(text, hint);
        }

        match tokio::time::timeout(self.timeout, service.parse(text, hint)).await {
            Ok(Ok(intent)) => {
                self.circuit_breaker.record_success(ServiceKind::IntentParsing);
                self.cache.insert(key, intent.clone()).await;
                ParseResult {
                    mode: ParseMode::Live,
                    intent,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    service = service.name(),
                    error = %e,
                    "Live parse failed, using fallback parser"
                );
                self.circuit_breaker.record_failure(ServiceKind::IntentParsing);
                self.fallback(text, hint)
            }
            Err(_) => {
                tracing::warn!(
                    service = service.name(),
                    timeout = ?self.timeout,
                    "Live parse timed out, using fallback parser"
                );
                self.circuit_breaker.record_failure(ServiceKind::IntentParsing);
                self.fallback(text, hint)
            }
        }
    }

    fn fallback(&self, text: &str, hint: Option<Language>) -> ParseResult {
        ParseResult {
            mode: ParseMode::Fallback,
            intent: self.fallback.parse(text, hint),
        }
    }
}

impl<C> std::fmt::Debug for IntentParser<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentParser")
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
