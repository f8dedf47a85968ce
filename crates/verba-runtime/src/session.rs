//! Async driver for one case.
//!
//! A [`CaseSession`] owns the [`Case`] behind a `parking_lot::Mutex` and is
//! the only thing that mutates it. Network work (live parsing, external
//! adjudication) runs with the lock released; the lock is taken again only
//! to apply the completion, so concurrent callers serialize on the state
//! machine and the transition rules decide who wins.
//!
//! After every completion the session waits `advance_delay` and then moves
//! the cursor onto the newly active stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use verba_core::{
    Case, EvidenceItem, FieldExtractor, ParseClock, Stage, SystemClock, Testimony, Transition,
};

use crate::adjudicator::Adjudicator;
use crate::config::RuntimeConfig;
use crate::evidence;
use crate::intent::IntentParser;
use crate::providers::ProviderRegistry;
use crate::resilience::CircuitBreaker;
use crate::RuntimeError;

pub struct CaseSession<C = SystemClock> {
    case: Mutex<Case>,
    parser: Arc<IntentParser<C>>,
    adjudicator: Arc<Adjudicator>,
    advance_delay: Duration,
}

impl CaseSession<SystemClock> {
    /// New case wired from runtime config. Both services share one breaker.
    pub fn from_config(config: &RuntimeConfig, registry: &ProviderRegistry) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        Self::new(
            Arc::new(IntentParser::from_config(config, circuit_breaker.clone())),
            Arc::new(Adjudicator::from_config(config, registry, circuit_breaker)),
            config.advance_delay,
        )
    }
}

impl<C: ParseClock> CaseSession<C> {
    pub fn new(
        parser: Arc<IntentParser<C>>,
        adjudicator: Arc<Adjudicator>,
        advance_delay: Duration,
    ) -> Self {
        Self::resume(Case::new(), parser, adjudicator, advance_delay)
    }

    /// Continue a previously saved case.
    pub fn resume(
        case: Case,
        parser: Arc<IntentParser<C>>,
        adjudicator: Arc<Adjudicator>,
        advance_delay: Duration,
    ) -> Self {
        Self {
            case: Mutex::new(case),
            parser,
            adjudicator,
            advance_delay,
        }
    }

    /// Copy of the current case state.
    pub fn snapshot(&self) -> Case {
        self.case.lock().clone()
    }

    pub fn cursor(&self) -> Stage {
        self.case.lock().pipeline().cursor()
    }

    pub async fn begin(&self) -> Result<Transition, RuntimeError> {
        let transition = self.case.lock().begin()?;
        self.advance(transition).await
    }

    /// Parse the testimony, attach the parse and complete the Intent stage.
    pub async fn submit_testimony(&self, testimony: Testimony) -> Result<Transition, RuntimeError> {
        let parsed = self.parser.parse(testimony.text(), testimony.language).await;
        tracing::debug!(
            mode = ?parsed.mode,
            confidence = parsed.intent.confidence,
            "Testimony parsed"
        );
        let transition = self
            .case
            .lock()
            .submit_testimony(testimony.with_parsed(parsed))?;
        self.advance(transition).await
    }

    pub async fn structure_claim(&self) -> Result<Transition, RuntimeError> {
        let transition = self.case.lock().structure_claim()?;
        self.advance(transition).await
    }

    pub fn add_evidence(&self, item: EvidenceItem) -> Result<bool, RuntimeError> {
        Ok(self.case.lock().add_evidence(item)?)
    }

    pub fn remove_evidence(&self, evidence_id: &str) -> Result<Option<EvidenceItem>, RuntimeError> {
        Ok(self.case.lock().remove_evidence(evidence_id)?)
    }

    /// Read files from disk and add them to the draft.
    pub async fn add_evidence_files(
        &self,
        paths: &[PathBuf],
        extractor: &dyn FieldExtractor,
    ) -> Result<usize, RuntimeError> {
        let items = evidence::load_files(paths, extractor, Utc::now()).await?;
        let mut case = self.case.lock();
        let mut added = 0;
        for item in items {
            if case.add_evidence(item)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Seal the draft, then let the claim pick up the sealed references.
    pub async fn seal_evidence(
        &self,
        sealed_at: DateTime<Utc>,
    ) -> Result<Transition, RuntimeError> {
        let transition = {
            let mut case = self.case.lock();
            let transition = case.seal_evidence(sealed_at)?;
            if case.refresh_claim_with_evidence()? {
                tracing::info!("Claim recompiled to cite sealed evidence");
            }
            transition
        };
        self.advance(transition).await
    }

    /// Adjudicate the current inputs and complete the Adjudication stage.
    pub async fn adjudicate(&self) -> Result<Transition, RuntimeError> {
        let (transcript, claim, items) = {
            let case = self.case.lock();
            let (transcript, claim, evidence) = case.adjudication_inputs()?;
            (transcript.to_string(), claim.clone(), evidence.items().to_vec())
        };

        let outcome = self.adjudicator.adjudicate(&transcript, &claim, &items).await;
        tracing::info!(
            engine = ?outcome.engine(),
            decision = %outcome.verdict().decision,
            confidence = outcome.verdict().confidence,
            "Case adjudicated"
        );

        let transition = self.case.lock().record_verdict(outcome.into_verdict())?;
        self.advance(transition).await
    }

    pub async fn record_outcome(&self) -> Result<Transition, RuntimeError> {
        let transition = self.case.lock().record_outcome()?;
        self.advance(transition).await
    }

    pub fn annotate_settlement(&self, reference: impl Into<String>) -> Result<(), RuntimeError> {
        Ok(self.case.lock().annotate_settlement(reference)?)
    }

    pub async fn draft_agreement(&self) -> Result<Transition, RuntimeError> {
        let transition = self.case.lock().draft_agreement()?;
        self.advance(transition).await
    }

    pub fn navigate_to(&self, stage: Stage) -> Result<(), RuntimeError> {
        Ok(self.case.lock().navigate_to(stage)?)
    }

    pub fn reset(&self) {
        self.case.lock().reset();
    }

    /// Drive a fresh case from landing to agreement.
    pub async fn run(
        &self,
        testimony: Testimony,
        items: Vec<EvidenceItem>,
    ) -> Result<Case, RuntimeError> {
        self.begin().await?;
        self.submit_testimony(testimony).await?;
        self.structure_claim().await?;
        for item in items {
            if !self.add_evidence(item)? {
                tracing::debug!("Duplicate evidence skipped");
            }
        }
        self.seal_evidence(Utc::now()).await?;
        self.adjudicate().await?;
        self.record_outcome().await?;
        self.draft_agreement().await?;
        Ok(self.snapshot())
    }

    async fn advance(&self, transition: Transition) -> Result<Transition, RuntimeError> {
        if !self.advance_delay.is_zero() {
            tokio::time::sleep(self.advance_delay).await;
        }
        let cursor = self.case.lock().settle();
        tracing::info!(completed = %transition.completed, cursor = %cursor, "Stage advanced");
        Ok(transition)
    }
}

impl<C> std::fmt::Debug for CaseSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSession")
            .field("cursor", &self.case.lock().pipeline().cursor())
            .field("parser", &self.parser)
            .field("adjudicator", &self.adjudicator)
            .field("advance_delay", &self.advance_delay)
            .finish()
    }
}
