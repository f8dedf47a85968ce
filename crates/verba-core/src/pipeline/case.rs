use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Pipeline, StagePayload, Transition};
use super::{PipelineError, Stage, StageStatus};
use crate::adjudication::{self, EngineOutcome, SettlementRequest, Verdict};
use crate::agreement::Agreement;
use crate::claim::{self, StructuredIntent};
use crate::evidence::{EvidenceDraft, EvidenceItem, SealedEvidence};
use crate::hashing::Digest;
use crate::intent::{self, Language, ParseResult};

/// Shortest accepted testimony, in characters after trimming.
pub const MIN_TESTIMONY_CHARS: usize = 30;

/// How the testimony was captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestimonyMode {
    #[default]
    Text,
    Voice,
    Upload,
}

/// Payload of the Intent stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimony {
    pub mode: TestimonyMode,
    pub content: String,
    /// Speech-to-text output for voice testimony.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParseResult>,
    pub intent_digest: Digest,
}

impl Testimony {
    pub fn new(mode: TestimonyMode, content: impl Into<String>) -> Result<Self, PipelineError> {
        let content = content.into();
        let length = content.trim().chars().count();
        if length < MIN_TESTIMONY_CHARS {
            return Err(PipelineError::InvalidInput(format!(
                "testimony must be at least {} characters, got {}",
                MIN_TESTIMONY_CHARS, length
            )));
        }
        Ok(Self {
            mode,
            intent_digest: intent::intent_digest(&content),
            content,
            transcript: None,
            case_type: None,
            language: None,
            parsed: None,
        })
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn with_case_type(mut self, case_type: impl Into<String>) -> Self {
        self.case_type = Some(case_type.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Attach the intent parser's result.
    pub fn with_parsed(mut self, parsed: ParseResult) -> Self {
        self.parsed = Some(parsed);
        self
    }

    /// Text that adjudication reads: the transcript when present, else the content.
    pub fn text(&self) -> &str {
        self.transcript
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.content)
    }
}

/// Payload of the Outcome stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub verdict: Verdict,
    pub settlement: SettlementRequest,
}

/// One case: its pipeline and the evidence draft for the Evidence stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pipeline: Pipeline,
    #[serde(default)]
    draft: EvidenceDraft,
}

impl Case {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Generic completion. The typed operations below build the payloads.
    pub fn complete(
        &mut self,
        stage: Stage,
        payload: StagePayload,
    ) -> Result<Transition, PipelineError> {
        self.pipeline.complete(stage, payload)
    }

    pub fn settle(&mut self) -> Stage {
        self.pipeline.settle()
    }

    pub fn navigate_to(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.pipeline.navigate_to(stage)
    }

    pub fn reset(&mut self) {
        self.pipeline.reset();
        self.draft = EvidenceDraft::new();
    }

    pub fn begin(&mut self) -> Result<Transition, PipelineError> {
        self.complete(Stage::Landing, StagePayload::Landing)
    }

    pub fn submit_testimony(&mut self, testimony: Testimony) -> Result<Transition, PipelineError> {
        self.complete(Stage::Intent, StagePayload::Intent(testimony))
    }

    /// Compile the testimony into a structured claim.
    pub fn structure_claim(&mut self) -> Result<Transition, PipelineError> {
        let claim = self.compile_claim(Stage::ClaimStructuring)?;
        self.complete(Stage::ClaimStructuring, StagePayload::ClaimStructuring(claim))
    }

    pub fn draft(&self) -> &EvidenceDraft {
        &self.draft
    }

    /// Add a document to the draft. Returns false for a duplicate digest.
    pub fn add_evidence(&mut self, item: EvidenceItem) -> Result<bool, PipelineError> {
        self.require_open_evidence()?;
        Ok(self.draft.add(item))
    }

    pub fn remove_evidence(
        &mut self,
        evidence_id: &str,
    ) -> Result<Option<EvidenceItem>, PipelineError> {
        self.require_open_evidence()?;
        Ok(self.draft.remove(evidence_id))
    }

    /// Seal the draft and complete the Evidence stage.
    pub fn seal_evidence(&mut self, sealed_at: DateTime<Utc>) -> Result<Transition, PipelineError> {
        self.require_open_evidence()?;
        let sealed = self.draft.clone().seal(sealed_at);
        let transition = self.complete(Stage::Evidence, StagePayload::Evidence(sealed))?;
        self.draft = EvidenceDraft::new();
        Ok(transition)
    }

    /// Recompile the claim so it cites evidence sealed after it was produced.
    ///
    /// Applies only when the claim has no evidence references and the
    /// sealed set is not empty. Returns whether the claim was replaced.
    pub fn refresh_claim_with_evidence(&mut self) -> Result<bool, PipelineError> {
        let stale = match (self.claim(), self.evidence()) {
            (Some(claim), Some(evidence)) => !claim.has_evidence() && !evidence.is_empty(),
            _ => false,
        };
        if !stale {
            return Ok(false);
        }
        let claim = self.compile_claim(Stage::ClaimStructuring)?;
        self.pipeline
            .compensate(StagePayload::ClaimStructuring(claim))?;
        Ok(true)
    }

    /// Transcript, claim and sealed evidence, once all three exist.
    pub fn adjudication_inputs(
        &self,
    ) -> Result<(&str, &StructuredIntent, &SealedEvidence), PipelineError> {
        let testimony = self
            .testimony()
            .ok_or_else(|| PipelineError::precondition(Stage::Adjudication, "no testimony"))?;
        let claim = self.claim().ok_or_else(|| {
            PipelineError::precondition(Stage::Adjudication, "claim is not structured")
        })?;
        let evidence = self.evidence().ok_or_else(|| {
            PipelineError::precondition(Stage::Adjudication, "evidence is not sealed")
        })?;
        Ok((testimony.text(), claim, evidence))
    }

    /// Deterministic adjudication over the current inputs. Does not complete the stage.
    pub fn adjudicate_rules(&self) -> Result<EngineOutcome, PipelineError> {
        let (transcript, claim, evidence) = self.adjudication_inputs()?;
        Ok(adjudication::adjudicate_rules(transcript, claim, evidence.items()))
    }

    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<Transition, PipelineError> {
        self.complete(Stage::Adjudication, StagePayload::Adjudication(verdict))
    }

    /// Complete the Outcome stage with the verdict and its settlement request.
    pub fn record_outcome(&mut self) -> Result<Transition, PipelineError> {
        let verdict = self.verdict().cloned().ok_or_else(|| {
            PipelineError::precondition(Stage::Outcome, "no verdict recorded")
        })?;
        let settlement = self.settlement_request()?;
        self.complete(
            Stage::Outcome,
            StagePayload::Outcome(OutcomeRecord {
                verdict,
                settlement,
            }),
        )
    }

    pub fn settlement_request(&self) -> Result<SettlementRequest, PipelineError> {
        let verdict = self.verdict().ok_or_else(|| {
            PipelineError::precondition(Stage::Outcome, "no verdict recorded")
        })?;
        let case_hash = self.case_hash().ok_or_else(|| {
            PipelineError::precondition(Stage::Outcome, "claim is not structured")
        })?;
        Ok(verdict.settlement_request(case_hash, &self.evidence_root()))
    }

    /// Attach a settlement writer's reference to the recorded outcome.
    pub fn annotate_settlement(
        &mut self,
        reference: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let mut record = self.outcome().cloned().ok_or_else(|| {
            PipelineError::precondition(Stage::Outcome, "outcome is not recorded")
        })?;
        record.verdict.annotate_settlement(reference);
        self.pipeline.compensate(StagePayload::Outcome(record))
    }

    /// Draft the agreement from the recorded outcome and complete the case.
    pub fn draft_agreement(&mut self) -> Result<Transition, PipelineError> {
        let record = self.outcome().ok_or_else(|| {
            PipelineError::precondition(Stage::Agreement, "outcome is not recorded")
        })?;
        let claim = self.claim().ok_or_else(|| {
            PipelineError::precondition(Stage::Agreement, "claim is not structured")
        })?;
        let agreement = Agreement::draft(claim, &record.verdict, &self.evidence_root());
        self.complete(Stage::Agreement, StagePayload::Agreement(agreement))
    }

    pub fn testimony(&self) -> Option<&Testimony> {
        match self.pipeline.payload(Stage::Intent) {
            Some(StagePayload::Intent(t)) => Some(t),
            _ => None,
        }
    }

    pub fn claim(&self) -> Option<&StructuredIntent> {
        match self.pipeline.payload(Stage::ClaimStructuring) {
            Some(StagePayload::ClaimStructuring(c)) => Some(c),
            _ => None,
        }
    }

    pub fn evidence(&self) -> Option<&SealedEvidence> {
        match self.pipeline.payload(Stage::Evidence) {
            Some(StagePayload::Evidence(e)) => Some(e),
            _ => None,
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self.pipeline.payload(Stage::Adjudication) {
            Some(StagePayload::Adjudication(v)) => Some(v),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&OutcomeRecord> {
        match self.pipeline.payload(Stage::Outcome) {
            Some(StagePayload::Outcome(o)) => Some(o),
            _ => None,
        }
    }

    pub fn agreement(&self) -> Option<&Agreement> {
        match self.pipeline.payload(Stage::Agreement) {
            Some(StagePayload::Agreement(a)) => Some(a),
            _ => None,
        }
    }

    /// Digest of the structured claim.
    pub fn case_hash(&self) -> Option<&Digest> {
        self.claim().map(|c| &c.digest)
    }

    /// Root of the sealed evidence, all zeros before sealing or when empty.
    pub fn evidence_root(&self) -> Digest {
        self.evidence()
            .map(|e| e.root().clone())
            .unwrap_or_else(Digest::zero)
    }

    fn compile_claim(&self, stage: Stage) -> Result<StructuredIntent, PipelineError> {
        let testimony = self
            .testimony()
            .ok_or_else(|| PipelineError::precondition(stage, "no testimony"))?;
        claim::compile(
            testimony.text(),
            testimony.case_type.as_deref(),
            self.evidence(),
        )
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))
    }

    fn require_open_evidence(&self) -> Result<(), PipelineError> {
        match self.pipeline.status(Stage::Evidence) {
            StageStatus::Active => Ok(()),
            StageStatus::Completed => Err(PipelineError::Sealed(Stage::Evidence)),
            StageStatus::Locked => Err(PipelineError::precondition(
                Stage::Evidence,
                "claim is not structured",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudication::{Decision, Engine};
    use crate::evidence::{DetectedFields, ExtractedEvidence};
    use chrono::TimeZone;

    const TESTIMONY: &str =
        "I paid ₹4,500 to Sharma Traders for a sofa that was never delivered to my home.";

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    fn invoice() -> EvidenceItem {
        EvidenceItem::from_upload("bill.pdf", "application/pdf", b"%PDF-1.4 invoice", at())
            .with_extracted(ExtractedEvidence {
                fields: DetectedFields {
                    invoice_number: Some("INV-2044".into()),
                    amount: Some("4,500".into()),
                    currency: Some("INR".into()),
                    ..Default::default()
                },
                summary: "Invoice: INV-2044".into(),
            })
    }

    fn case_at_evidence() -> Case {
        let mut case = Case::new();
        case.begin().unwrap();
        case.submit_testimony(Testimony::new(TestimonyMode::Text, TESTIMONY).unwrap())
            .unwrap();
        case.structure_claim().unwrap();
        case
    }

    #[test]
    fn test_short_testimony_rejected() {
        let err = Testimony::new(TestimonyMode::Text, "   too short   ").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(Testimony::new(TestimonyMode::Voice, "x".repeat(30)).is_ok());
    }

    #[test]
    fn test_transcript_preferred_for_adjudication() {
        let t = Testimony::new(TestimonyMode::Voice, "a".repeat(40))
            .unwrap()
            .with_transcript("spoken words");
        assert_eq!(t.text(), "spoken words");
        let blank = t.clone().with_transcript("  ");
        assert_eq!(blank.text(), "a".repeat(40));
    }

    #[test]
    fn test_full_case_flow() {
        let mut case = case_at_evidence();
        assert_eq!(case.pipeline().active_stage(), Some(Stage::Evidence));
        assert!(case.add_evidence(invoice()).unwrap());
        assert!(!case.add_evidence(invoice()).unwrap());
        case.seal_evidence(at()).unwrap();
        assert!(case.draft().is_empty());
        assert!(!case.evidence_root().is_zero());

        assert!(case.refresh_claim_with_evidence().unwrap());
        assert_eq!(case.claim().unwrap().evidence_refs.len(), 1);
        assert!(case.claim().unwrap().verify());
        assert_eq!(case.pipeline().active_stage(), Some(Stage::Adjudication));

        let outcome = case.adjudicate_rules().unwrap();
        assert_eq!(outcome.engine(), Engine::Rules);
        case.record_verdict(outcome.into_verdict()).unwrap();
        case.record_outcome().unwrap();
        let settlement = &case.outcome().unwrap().settlement;
        assert_eq!(&settlement.case_hash, case.case_hash().unwrap());
        assert_eq!(settlement.evidence_root, case.evidence_root());

        case.annotate_settlement("tx-0042").unwrap();
        assert_eq!(
            case.outcome().unwrap().verdict.settlement_ref.as_deref(),
            Some("tx-0042")
        );

        case.draft_agreement().unwrap();
        let agreement = case.agreement().unwrap();
        assert_eq!(&agreement.case_hash, case.case_hash().unwrap());
        assert!(agreement.verify());
        assert!(case.pipeline().is_finished());
        assert!(case.pipeline().is_consistent());
    }

    #[test]
    fn test_refresh_skipped_without_evidence() {
        let mut case = case_at_evidence();
        case.seal_evidence(at()).unwrap();
        assert!(case.evidence_root().is_zero());
        assert!(!case.refresh_claim_with_evidence().unwrap());
        assert!(case.claim().unwrap().evidence_refs.is_empty());
    }

    #[test]
    fn test_refresh_skipped_before_sealing() {
        let mut case = case_at_evidence();
        case.add_evidence(invoice()).unwrap();
        assert!(!case.refresh_claim_with_evidence().unwrap());
    }

    #[test]
    fn test_adjudication_before_sealing_fails() {
        let mut case = case_at_evidence();
        assert!(matches!(
            case.adjudicate_rules(),
            Err(PipelineError::PreconditionNotMet { .. })
        ));

        let verdict = Verdict {
            decision: Decision::Reject,
            confidence: 44,
            rationale: vec!["a".into(), "b".into()],
            recommended_action: "Hold funds pending further review".into(),
            reasoning_trace: vec![],
            engine: Engine::Rules,
            settlement_ref: None,
        };
        let before = case.clone();
        assert!(matches!(
            case.record_verdict(verdict),
            Err(PipelineError::PreconditionNotMet { .. })
        ));
        assert_eq!(case, before);
    }

    #[test]
    fn test_sealed_evidence_is_immutable() {
        let mut case = case_at_evidence();
        let item = invoice();
        let id = item.evidence_id.clone();
        case.add_evidence(item).unwrap();
        case.seal_evidence(at()).unwrap();

        assert_eq!(
            case.add_evidence(invoice()),
            Err(PipelineError::Sealed(Stage::Evidence))
        );
        assert_eq!(
            case.remove_evidence(&id),
            Err(PipelineError::Sealed(Stage::Evidence))
        );
        let sealed = case.evidence().cloned().unwrap();
        assert_eq!(
            case.pipeline.compensate(StagePayload::Evidence(sealed)),
            Err(PipelineError::Sealed(Stage::Evidence))
        );
    }

    #[test]
    fn test_evidence_locked_before_claim() {
        let mut case = Case::new();
        case.begin().unwrap();
        assert!(matches!(
            case.add_evidence(invoice()),
            Err(PipelineError::PreconditionNotMet { .. })
        ));
    }

    #[test]
    fn test_remove_evidence_from_draft() {
        let mut case = case_at_evidence();
        let item = invoice();
        let id = item.evidence_id.clone();
        case.add_evidence(item).unwrap();
        assert!(case.remove_evidence(&id).unwrap().is_some());
        assert!(case.draft().is_empty());
    }

    #[test]
    fn test_reset_clears_draft() {
        let mut case = case_at_evidence();
        case.add_evidence(invoice()).unwrap();
        case.reset();
        assert_eq!(case, Case::new());
    }

    #[test]
    fn test_case_serializes() {
        let case = case_at_evidence();
        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["pipeline"]["stages"]["intent"]["payload"]["stage"], "intent");
        assert_eq!(
            json["pipeline"]["stages"]["claim_structuring"]["payload"]["data"]["actor"],
            "User"
        );
        let back: Case = serde_json::from_value(json).unwrap();
        assert_eq!(back, case);
    }
}
