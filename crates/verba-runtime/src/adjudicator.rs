//! Adjudication with an optional external reasoning service.
//!
//! Rule signals are always computed first. When the engine mode asks for the
//! external path and a provider is available, one bounded call is made and
//! its output is validated by `verba_core::parse_decision`. Anything short
//! of a valid decision yields the deterministic verdict instead.

use std::sync::Arc;
use std::time::Duration;

use verba_core::{
    adjudicate_rules, parse_decision, EngineMode, EngineOutcome, EvidenceItem, RuleSignals,
    StructuredIntent, Verdict,
};

use crate::config::RuntimeConfig;
use crate::prompts::{build_adjudication_prompt, ADJUDICATION_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, ProviderRegistry, ReasoningProvider};
use crate::resilience::{CircuitBreaker, ServiceKind};

pub struct Adjudicator {
    provider: Option<Arc<dyn ReasoningProvider>>,
    mode: EngineMode,
    timeout: Duration,
    completion: CompletionConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Adjudicator {
    /// Rules engine only.
    pub fn rules_only() -> Self {
        Self {
            provider: None,
            mode: EngineMode::Rules,
            timeout: Duration::from_secs(8),
            completion: CompletionConfig::default(),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    pub fn new(
        provider: Option<Arc<dyn ReasoningProvider>>,
        mode: EngineMode,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            provider,
            mode,
            timeout,
            completion: CompletionConfig {
                timeout,
                ..CompletionConfig::default()
            },
            circuit_breaker,
        }
    }

    /// Build from runtime config.
    ///
    /// The provider is created only when the engine mode wants it. In `auto`
    /// mode a provider without credentials is skipped quietly; in `external`
    /// mode the same situation is logged as a warning.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let provider = if config.engine.wants_external() {
            let provider_config = config.reasoning.provider_config();
            match registry
                .validate(&config.reasoning.provider, &provider_config)
                .and_then(|()| registry.create(&config.reasoning.provider, &provider_config))
            {
                Ok(provider) => Some(provider),
                Err(e) if config.engine == EngineMode::External => {
                    tracing::warn!(
                        provider = %config.reasoning.provider,
                        error = %e,
                        "External engine unavailable, using rules"
                    );
                    None
                }
                Err(e) => {
                    tracing::debug!(
                        provider = %config.reasoning.provider,
                        reason = %e,
                        "No reasoning provider, using rules"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut adjudicator = Self::new(
            provider,
            config.engine,
            config.adjudication_timeout,
            circuit_breaker,
        );
        if let Some(model) = config.reasoning.options.get("model").and_then(|m| m.as_str()) {
            adjudicator.completion.model = model.to_string();
        }
        adjudicator
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Adjudicate a case. Never fails; the rules engine is the floor.
    pub async fn adjudicate(
        &self,
        transcript: &str,
        claim: &StructuredIntent,
        items: &[EvidenceItem],
    ) -> EngineOutcome {
        let signals = RuleSignals::compute(transcript, claim, items);

        let provider = match (&self.provider, self.mode.wants_external()) {
            (Some(provider), true) => provider,
            _ => return adjudicate_rules(transcript, claim, items),
        };

        if self.circuit_breaker.is_open(ServiceKind::Reasoning) {
            tracing::warn!("Reasoning circuit open, using rules engine");
            return adjudicate_rules(transcript, claim, items);
        }

        let call = self.external(provider.as_ref(), transcript, claim, items, &signals);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(verdict)) => {
                self.circuit_breaker.record_success(ServiceKind::Reasoning);
                tracing::info!(
                    provider = provider.name(),
                    decision = %verdict.decision,
                    confidence = verdict.confidence,
                    "External adjudication accepted"
                );
                EngineOutcome::External(verdict)
            }
            Ok(Err(reason)) => {
                tracing::warn!(
                    provider = provider.name(),
                    %reason,
                    "External adjudication rejected, using rules engine"
                );
                self.circuit_breaker.record_failure(ServiceKind::Reasoning);
                adjudicate_rules(transcript, claim, items)
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    timeout = ?self.timeout,
                    "External adjudication timed out, using rules engine"
                );
                self.circuit_breaker.record_failure(ServiceKind::Reasoning);
                adjudicate_rules(transcript, claim, items)
            }
        }
    }

    async fn external(
        &self,
        provider: &dyn ReasoningProvider,
        transcript: &str,
        claim: &StructuredIntent,
        items: &[EvidenceItem],
        signals: &RuleSignals,
    ) -> Result<Verdict, String> {
        let messages = vec![
            ChatMessage::system(ADJUDICATION_SYSTEM_PROMPT),
            ChatMessage::user(build_adjudication_prompt(transcript, claim, items, signals)),
        ];
        let response = provider
            .complete(messages, &self.completion)
            .await
            .map_err(|e| e.to_string())?;
        let decision = parse_decision(&response.content).map_err(|e| e.to_string())?;
        Ok(Verdict::from_external(decision, signals.claim_amount))
    }
}

impl std::fmt::Debug for Adjudicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adjudicator")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderError, TokenUsage};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use verba_core::{compile, Decision, DetectedFields, Engine, ExtractedEvidence};

    enum Reply {
        Text(&'static str),
        Error,
        Hang,
    }

    struct MockProvider {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReasoningProvider for MockProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(messages.len(), 2);
            match self.reply {
                Reply::Text(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    usage: TokenUsage::default(),
                    model: "mock".to_string(),
                    stop_reason: None,
                }),
                Reply::Error => Err(ProviderError::ApiError {
                    status: 500,
                    message: "boom".to_string(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(ProviderError::Timeout(Duration::from_secs(60)))
                }
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    const TRANSCRIPT: &str = "I paid ₹5000 to Sharma Electronics for a refrigerator. It never arrived and they stopped answering my calls after the payment cleared.";

    fn case() -> (StructuredIntent, Vec<EvidenceItem>) {
        let claim = compile(TRANSCRIPT, None, None).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let item = EvidenceItem::from_upload("receipt.txt", "text/plain", b"Receipt 5000", at)
            .with_extracted(ExtractedEvidence {
                fields: DetectedFields {
                    invoice_number: Some("R-77".into()),
                    amount: Some("5000".into()),
                    ..Default::default()
                },
                summary: String::new(),
            });
        (claim, vec![item])
    }

    fn adjudicator(provider: Arc<MockProvider>, mode: EngineMode) -> Adjudicator {
        Adjudicator::new(
            Some(provider),
            mode,
            Duration::from_secs(8),
            Arc::new(CircuitBreaker::default()),
        )
    }

    #[tokio::test]
    async fn test_rules_mode_never_calls_provider() {
        let provider = MockProvider::new(Reply::Error);
        let (claim, items) = case();
        let outcome = adjudicator(provider.clone(), EngineMode::Rules)
            .adjudicate(TRANSCRIPT, &claim, &items)
            .await;

        assert_eq!(outcome.engine(), Engine::Rules);
        assert_eq!(outcome, adjudicate_rules(TRANSCRIPT, &claim, &items));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_external_decision_accepted() {
        let provider = MockProvider::new(Reply::Text(
            "```json\n{\"decision\":\"PARTIAL\",\"confidence\":64.6,\"rationale\":[\"Receipt R-77 shows 5000\",\"Delivery unproven\"]}\n```",
        ));
        let (claim, items) = case();
        let outcome = adjudicator(provider, EngineMode::External)
            .adjudicate(TRANSCRIPT, &claim, &items)
            .await;

        assert_eq!(outcome.engine(), Engine::External);
        let verdict = outcome.verdict();
        assert_eq!(verdict.decision, Decision::Partial);
        assert_eq!(verdict.confidence, 65);
        assert_eq!(verdict.recommended_action, "Release ₹3,250 (65% partial approval)");
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_falls_back() {
        let provider = MockProvider::new(Reply::Text(
            "{\"decision\":\"APPROVE\",\"confidence\":150,\"rationale\":[\"a\",\"b\"]}",
        ));
        let (claim, items) = case();
        let outcome = adjudicator(provider, EngineMode::Auto)
            .adjudicate(TRANSCRIPT, &claim, &items)
            .await;

        assert_eq!(outcome.engine(), Engine::Rules);
        assert_eq!(outcome, adjudicate_rules(TRANSCRIPT, &claim, &items));
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let provider = MockProvider::new(Reply::Error);
        let (claim, items) = case();
        let outcome = adjudicator(provider, EngineMode::External)
            .adjudicate(TRANSCRIPT, &claim, &items)
            .await;
        assert_eq!(outcome.engine(), Engine::Rules);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let provider = MockProvider::new(Reply::Hang);
        let (claim, items) = case();
        let outcome = adjudicator(provider, EngineMode::External)
            .adjudicate(TRANSCRIPT, &claim, &items)
            .await;
        assert_eq!(outcome.engine(), Engine::Rules);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_provider() {
        let provider = MockProvider::new(Reply::Error);
        let (claim, items) = case();
        let adjudicator = adjudicator(provider.clone(), EngineMode::External);

        for _ in 0..4 {
            let outcome = adjudicator.adjudicate(TRANSCRIPT, &claim, &items).await;
            assert_eq!(outcome.engine(), Engine::Rules);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_from_config_rules_mode_has_no_provider() {
        let adjudicator = Adjudicator::from_config(
            &RuntimeConfig::default(),
            &ProviderRegistry::with_defaults(),
            Arc::new(CircuitBreaker::default()),
        );
        assert!(adjudicator.provider.is_none());
        assert_eq!(adjudicator.mode(), EngineMode::Rules);
    }

    #[test]
    fn test_from_config_unknown_provider_falls_back() {
        let config = RuntimeConfig::from_yaml("engine: external\nreasoning:\n  provider: oracle\n").unwrap();
        let adjudicator = Adjudicator::from_config(
            &config,
            &ProviderRegistry::new(),
            Arc::new(CircuitBreaker::default()),
        );
        assert!(adjudicator.provider.is_none());
        assert_eq!(adjudicator.mode(), EngineMode::External);
    }
}
