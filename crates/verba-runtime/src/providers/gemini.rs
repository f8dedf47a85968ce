//! Google Gemini provider.
//!
//! Talks to the `generateContent` endpoint and returns the concatenated
//! candidate text. The API key is held in an [`ApiCredential`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, ProviderError, ReasoningProvider,
    TokenUsage,
};

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Gemini API key",
        ))
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        ApiCredential::from_env(GEMINI_API_KEY_ENV, "Gemini API key").map(Self::with_credential)
    }

    /// `api_key`, `base_url` and `model` from config; key falls back to `GEMINI_API_KEY`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            GEMINI_API_KEY_ENV,
            "Gemini API key",
        )?;
        let mut provider = Self::with_credential(credential);
        if let Some(url) = config["base_url"].as_str() {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = config["model"].as_str() {
            provider.model = model.to_string();
        }
        Ok(provider)
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> GenerateRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for msg in messages {
        let part = Part {
            text: Some(msg.content),
        };
        match msg.role.as_str() {
            "system" => system.push(part),
            "assistant" => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![part],
            }),
            _ => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![part],
            }),
        }
    }

    GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: system,
        }),
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            response_mime_type: config.json_response.then_some("application/json"),
        },
    }
}

fn into_completion(
    body: GenerateResponse,
    model: &str,
) -> Result<CompletionResponse, ProviderError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no candidates".to_string()))?;
    let content = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    let usage = body
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage,
        model: body.model_version.unwrap_or_else(|| model.to_string()),
        stop_reason: candidate.finish_reason,
    })
}

#[async_trait]
impl ReasoningProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(self.endpoint(&self.model))
            .header("x-goog-api-key", self.credential.expose())
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|e| e.to_string());
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        into_completion(body, &self.model)
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "...",             // Optional, falls back to GEMINI_API_KEY
///   "base_url": "https://...",    // Optional
///   "model": "gemini-1.5-flash"   // Optional
/// }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ReasoningProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", GEMINI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Gemini API key required: set 'api_key' in config or {} env",
                GEMINI_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "model": DEFAULT_MODEL })
    }

    fn description(&self) -> &'static str {
        "Google Gemini provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://proxy.example.com/v1beta/",
            "model": "gemini-1.5-pro"
        });
        let provider = GeminiProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://proxy.example.com/v1beta");
        assert_eq!(provider.model(), "gemini-1.5-pro");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
        assert_eq!(
            provider.endpoint(provider.model()),
            "https://proxy.example.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "AIza-super-secret-key-12345";
        let provider = GeminiProvider::new(secret_key);
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(GeminiProvider::new("key").health_check().await);
        assert!(!GeminiProvider::new("").health_check().await);
    }

    #[test]
    fn test_request_splits_system_instruction() {
        let request = build_request(
            vec![ChatMessage::system("rules"), ChatMessage::user("case")],
            &CompletionConfig::default(),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "case");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_response_text_is_concatenated() {
        let body: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"decision\":"}, {"text": "\"APPROVE\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 30}
        }))
        .unwrap();
        let completion = into_completion(body, "gemini-1.5-flash").unwrap();
        assert_eq!(completion.content, "{\"decision\":\"APPROVE\"}");
        assert_eq!(completion.usage.total(), 150);
        assert_eq!(completion.model, "gemini-1.5-flash");
        assert_eq!(completion.stop_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_empty_candidates_is_parse_error() {
        let body: GenerateResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            into_completion(body, "m"),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[test]
    fn test_factory_validates_base_url() {
        let factory = GeminiProviderFactory;
        assert_eq!(factory.provider_type(), "gemini");
        let config = serde_json::json!({ "api_key": "k", "base_url": "invalid-url" });
        assert!(factory.validate_config(&config).is_err());
        let config = serde_json::json!({ "api_key": "k" });
        assert!(factory.validate_config(&config).is_ok());
        assert!(factory.create(&config).is_ok());
    }
}
