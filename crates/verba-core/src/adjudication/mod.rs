//! Adjudication: rule signals, the deterministic verdict, and validation of
//! external decisions.
//!
//! Rule signals are always computed first. The runtime may then ask an
//! external reasoning service; whatever it returns must pass
//! [`parse_decision`] or the deterministic verdict stands. Both paths build
//! the same [`Verdict`] and differ only in [`Engine`].

mod external;
mod rules;
mod signals;

pub use external::{
    parse_decision, strip_fences, validate_decision_schema, Citation, DecisionError,
    ExternalDecision,
};
pub use rules::{format_grouped, insights, recommended_action, REASONING_TRACE};
pub use signals::RuleSignals;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::claim::StructuredIntent;
use crate::evidence::EvidenceItem;
use crate::hashing::Digest;

/// Outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Partial,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Partial => "PARTIAL",
            Decision::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which engine produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Rules,
    External,
}

/// Engine selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Deterministic rules only.
    #[default]
    Rules,
    /// External reasoning service, rules on failure.
    External,
    /// External when a credential is present, otherwise rules.
    Auto,
}

impl EngineMode {
    pub fn wants_external(&self) -> bool {
        matches!(self, EngineMode::External | EngineMode::Auto)
    }
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rules" | "deterministic" => Ok(EngineMode::Rules),
            "external" | "gemini" => Ok(EngineMode::External),
            "auto" => Ok(EngineMode::Auto),
            other => Err(format!("unknown engine mode: {}", other)),
        }
    }
}

/// Adjudicated outcome of a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    /// Integer in [0, 100].
    pub confidence: u8,
    pub rationale: Vec<String>,
    pub recommended_action: String,
    #[serde(default)]
    pub reasoning_trace: Vec<String>,
    pub engine: Engine,
    /// Opaque reference from the settlement writer, attached after the fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_ref: Option<String>,
}

/// What a settlement writer needs to record a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub case_hash: Digest,
    pub evidence_root: Digest,
    pub decision: Decision,
    pub confidence: u8,
}

impl Verdict {
    /// Build a verdict from a validated external decision.
    pub fn from_external(decision: ExternalDecision, claim_amount: u64) -> Self {
        Self {
            recommended_action: recommended_action(
                decision.decision,
                decision.confidence,
                claim_amount,
            ),
            decision: decision.decision,
            confidence: decision.confidence,
            rationale: decision.rationale,
            reasoning_trace: REASONING_TRACE.iter().map(|s| s.to_string()).collect(),
            engine: Engine::External,
            settlement_ref: None,
        }
    }

    pub fn settlement_request(
        &self,
        case_hash: &Digest,
        evidence_root: &Digest,
    ) -> SettlementRequest {
        SettlementRequest {
            case_hash: case_hash.clone(),
            evidence_root: evidence_root.clone(),
            decision: self.decision,
            confidence: self.confidence,
        }
    }

    /// Attach the settlement writer's reference. Never feeds adjudication.
    pub fn annotate_settlement(&mut self, reference: impl Into<String>) {
        self.settlement_ref = Some(reference.into());
    }
}

/// Verdict tagged with the engine that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Rules(Verdict),
    External(Verdict),
}

impl EngineOutcome {
    pub fn engine(&self) -> Engine {
        match self {
            EngineOutcome::Rules(_) => Engine::Rules,
            EngineOutcome::External(_) => Engine::External,
        }
    }

    pub fn verdict(&self) -> &Verdict {
        match self {
            EngineOutcome::Rules(v) | EngineOutcome::External(v) => v,
        }
    }

    pub fn into_verdict(self) -> Verdict {
        match self {
            EngineOutcome::Rules(v) | EngineOutcome::External(v) => v,
        }
    }
}

/// Deterministic adjudication. Always available, no I/O.
pub fn adjudicate_rules(
    transcript: &str,
    claim: &StructuredIntent,
    evidence: &[EvidenceItem],
) -> EngineOutcome {
    let signals = RuleSignals::compute(transcript, claim, evidence);
    EngineOutcome::Rules(rules::decide(&signals, evidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict() -> Verdict {
        Verdict {
            decision: Decision::Approve,
            confidence: 80,
            rationale: vec!["a".into(), "b".into()],
            recommended_action: "Release ₹5,000 to claimant".into(),
            reasoning_trace: vec![],
            engine: Engine::Rules,
            settlement_ref: None,
        }
    }

    #[test]
    fn test_engine_mode_parsing() {
        assert_eq!("rules".parse::<EngineMode>().unwrap(), EngineMode::Rules);
        assert_eq!("deterministic".parse::<EngineMode>().unwrap(), EngineMode::Rules);
        assert_eq!("GEMINI".parse::<EngineMode>().unwrap(), EngineMode::External);
        assert_eq!("auto".parse::<EngineMode>().unwrap(), EngineMode::Auto);
        assert!("sometimes".parse::<EngineMode>().is_err());
        assert!(!EngineMode::default().wants_external());
    }

    #[test]
    fn test_settlement_annotation() {
        let mut v = verdict();
        let request = v.settlement_request(&Digest::zero(), &Digest::zero());
        assert_eq!(request.decision, Decision::Approve);
        assert_eq!(request.confidence, 80);

        v.annotate_settlement("tx-42");
        assert_eq!(v.settlement_ref.as_deref(), Some("tx-42"));
    }

    #[test]
    fn test_engine_outcome_tags() {
        let rules = EngineOutcome::Rules(verdict());
        assert_eq!(rules.engine(), Engine::Rules);
        let external = EngineOutcome::External(verdict());
        assert_eq!(external.engine(), Engine::External);
        assert_eq!(external.into_verdict().confidence, 80);
    }

    #[test]
    fn test_verdict_serialization_shape() {
        let json = serde_json::to_value(verdict()).unwrap();
        assert_eq!(json["decision"], "APPROVE");
        assert_eq!(json["engine"], "rules");
        assert!(json.get("settlement_ref").is_none());
    }

    #[test]
    fn test_documented_claim_is_approved() {
        use crate::evidence::{DetectedFields, ExtractedEvidence};
        use chrono::{TimeZone, Utc};

        let mut transcript = String::from("I paid ₹4,500 to ABC Traders for a sofa. ");
        while transcript.chars().count() < 250 {
            transcript.push('x');
        }
        assert_eq!(transcript.chars().count(), 250);

        let claim = crate::claim::compile(&transcript, None, None).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let items = vec![EvidenceItem::from_upload("bill.pdf", "application/pdf", b"%PDF", at)
            .with_extracted(ExtractedEvidence {
                fields: DetectedFields {
                    invoice_number: Some("INV-2044".into()),
                    amount: Some("4,450".into()),
                    ..Default::default()
                },
                summary: "Invoice: INV-2044".into(),
            })];

        let outcome = adjudicate_rules(&transcript, &claim, &items);
        assert_eq!(outcome.engine(), Engine::Rules);
        let v = outcome.into_verdict();
        assert_eq!(v.decision, Decision::Approve);
        assert_eq!(v.confidence, 80);
        assert_eq!(v.rationale[0], "Strong evidence supports the claim.");
        assert_eq!(v.rationale[1], "Invoice INV-2044 detected in bill.pdf");
        assert!(v
            .rationale
            .contains(&"Detailed testimony provides comprehensive context.".to_string()));
        assert_eq!(v.recommended_action, "Release ₹4,500 to claimant");
    }

    #[test]
    fn test_short_claim_without_evidence_is_rejected() {
        let transcript = "He never paid me back for it.."; // 30 chars
        assert_eq!(transcript.chars().count(), 30);
        let claim = crate::claim::compile(transcript, None, None).unwrap();

        let v = adjudicate_rules(transcript, &claim, &[]).into_verdict();
        assert_eq!(v.decision, Decision::Reject);
        assert_eq!(v.confidence, 44);
        assert_eq!(v.rationale[0], "No evidence provided to support the claim.");
        assert_eq!(v.engine, Engine::Rules);
    }

    #[test]
    fn test_from_external_builds_action() {
        let decision = ExternalDecision {
            decision: Decision::Partial,
            confidence: 60,
            rationale: vec!["x".into(), "y".into()],
            citations: vec![],
        };
        let v = Verdict::from_external(decision, 10_000);
        assert_eq!(v.engine, Engine::External);
        assert_eq!(v.recommended_action, "Release ₹6,000 (60% partial approval)");
    }
}
