//! Settlement agreement drafted from an adjudicated case.

use serde::{Deserialize, Serialize};

use crate::adjudication::Verdict;
use crate::claim::StructuredIntent;
use crate::hashing::{self, Digest};

/// Terms text plus the digests that bind it to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    /// `agr_` followed by the first 16 hex digits of the terms hash.
    pub agreement_id: String,
    pub case_hash: Digest,
    pub evidence_root: Digest,
    pub terms: String,
    pub terms_hash: Digest,
}

impl Agreement {
    /// Render the terms for a case and hash them.
    ///
    /// The terms embed both digests, so a changed claim or evidence set
    /// always yields a different agreement id.
    pub fn draft(claim: &StructuredIntent, verdict: &Verdict, evidence_root: &Digest) -> Self {
        let terms = render_terms(claim, verdict, evidence_root);
        let terms_hash = hashing::digest_text(&terms);
        let id_head: String = terms_hash.hex().chars().take(16).collect();
        Self {
            agreement_id: format!("agr_{}", id_head),
            case_hash: claim.digest.clone(),
            evidence_root: evidence_root.clone(),
            terms,
            terms_hash,
        }
    }

    /// True when `terms_hash` still matches `terms`.
    pub fn verify(&self) -> bool {
        hashing::digest_text(&self.terms) == self.terms_hash
    }
}

fn render_terms(claim: &StructuredIntent, verdict: &Verdict, evidence_root: &Digest) -> String {
    let mut lines = vec![
        "SETTLEMENT AGREEMENT".to_string(),
        String::new(),
        format!("Case hash: {}", claim.digest),
        format!("Evidence root: {}", evidence_root),
        String::new(),
        format!("Claimant: {}", claim.actor),
        format!("Counterparty: {}", claim.counterparty),
        format!("Claim: {}", claim.claim),
        format!(
            "Amount: {}",
            claim.value.as_deref().unwrap_or("Not specified")
        ),
        format!("Context: {}", claim.context),
        String::new(),
        format!(
            "Decision: {} ({}% confidence)",
            verdict.decision, verdict.confidence
        ),
        format!("Action: {}", verdict.recommended_action),
        "Grounds:".to_string(),
    ];
    lines.extend(verdict.rationale.iter().map(|r| format!("- {}", r)));
    if !claim.evidence_refs.is_empty() {
        lines.push("Evidence:".to_string());
        lines.extend(claim.evidence_refs.iter().map(|r| format!("- {}", r)));
    }
    lines.push(String::new());
    lines.push(
        "Both parties accept the decision above as final settlement of this claim.".to_string(),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudication::{Decision, Engine};
    use crate::claim;

    fn verdict() -> Verdict {
        Verdict {
            decision: Decision::Approve,
            confidence: 80,
            rationale: vec![
                "Strong evidence supports the claim.".into(),
                "Invoice INV-2044 detected in bill.pdf".into(),
            ],
            recommended_action: "Release ₹4,500 to claimant".into(),
            reasoning_trace: vec![],
            engine: Engine::Rules,
            settlement_ref: None,
        }
    }

    #[test]
    fn test_draft_binds_digests() {
        let claim =
            claim::compile("I paid ₹4,500 to Sharma Traders for a sofa", None, None).unwrap();
        let agreement = Agreement::draft(&claim, &verdict(), &Digest::zero());

        assert_eq!(agreement.case_hash, claim.digest);
        assert!(agreement.evidence_root.is_zero());
        assert!(agreement.verify());
        assert!(agreement.agreement_id.starts_with("agr_"));
        assert_eq!(agreement.agreement_id.len(), 4 + 16);
        assert!(agreement.terms.contains("Amount: ₹4500"));
        assert!(agreement.terms.contains("Decision: APPROVE (80% confidence)"));
        assert!(agreement.terms.contains("- Invoice INV-2044 detected in bill.pdf"));
    }

    #[test]
    fn test_draft_is_deterministic() {
        let claim = claim::compile("He never paid me back for the bike", None, None).unwrap();
        let a = Agreement::draft(&claim, &verdict(), &Digest::zero());
        let b = Agreement::draft(&claim, &verdict(), &Digest::zero());
        assert_eq!(a, b);

        let other_root = hashing::digest_text("evidence");
        let c = Agreement::draft(&claim, &verdict(), &other_root);
        assert_ne!(a.terms_hash, c.terms_hash);
        assert_ne!(a.agreement_id, c.agreement_id);
    }

    #[test]
    fn test_tampered_terms_fail_verification() {
        let claim = claim::compile("He never paid me back for the bike", None, None).unwrap();
        let mut agreement = Agreement::draft(&claim, &verdict(), &Digest::zero());
        agreement.terms.push_str("\nExtra clause.");
        assert!(!agreement.verify());
    }
}
