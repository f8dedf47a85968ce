//! Rule signals: cheap local scores computed before any engine runs.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::claim::{ClaimType, StructuredIntent};
use crate::evidence::{self, EvidenceItem};

/// Relative claim/evidence difference, in percent, still counted as a match.
pub const MATCH_TOLERANCE_PCT: f64 = 2.0;

pub const NOTE_MISMATCH: &str = "Amount mismatch between claim and evidence";
pub const NOTE_NO_AMOUNT: &str = "No amount found in evidence";
pub const NOTE_NO_EVIDENCE: &str = "No evidence files provided";
pub const NOTE_WEAK_EVIDENCE: &str = "Weak evidence (missing invoice/amount/date)";

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"[\d,]+").unwrap();
}

const CLAIM_FAMILIES: &[(&[&str], ClaimType)] = &[
    (&["refund", "return"], ClaimType::Refund),
    (&["wage", "salary", "unpaid"], ClaimType::Wage),
    (&["rent", "rental", "landlord"], ClaimType::Rental),
    (&["service", "delivery", "contract"], ClaimType::Service),
    (&["scam", "fraud"], ClaimType::Fraud),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSignals {
    pub evidence_score: u8,
    pub claim_amount: u64,
    pub claim_type: ClaimType,
    pub match_score: i32,
    pub amount_match: bool,
    pub amount_difference: f64,
    /// Largest amount found across evidence items.
    pub max_evidence_amount: Option<f64>,
    pub transcript_score: i32,
    pub transcript_len: usize,
    /// Missing-proof notes, in detection order.
    pub notes: Vec<String>,
}

impl RuleSignals {
    pub fn compute(transcript: &str, claim: &StructuredIntent, items: &[EvidenceItem]) -> Self {
        let evidence_score = evidence::strength(items);
        let claim_amount = claim.value.as_deref().map(claim_amount).unwrap_or(0);
        let transcript_len = transcript.chars().count();

        let max_evidence_amount = items
            .iter()
            .filter_map(|i| i.fields().and_then(|f| f.numeric_amount()))
            .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));

        let mut notes = Vec::new();
        let mut match_score = 0;
        let mut amount_match = false;
        let mut amount_difference = 0.0;

        match max_evidence_amount {
            Some(max) if claim_amount > 0 => {
                let claimed = claim_amount as f64;
                amount_difference = (claimed - max).abs();
                if amount_difference / claimed * 100.0 <= MATCH_TOLERANCE_PCT {
                    match_score = 3;
                    amount_match = true;
                } else {
                    match_score = -2;
                    notes.push(NOTE_MISMATCH.to_string());
                }
            }
            None if claim_amount > 0 => notes.push(NOTE_NO_AMOUNT.to_string()),
            _ => {}
        }

        if evidence_score == 0 {
            notes.push(NOTE_NO_EVIDENCE.to_string());
        } else if evidence_score < 3 {
            notes.push(NOTE_WEAK_EVIDENCE.to_string());
        }

        Self {
            evidence_score,
            claim_amount,
            claim_type: claim_type(&claim.claim),
            match_score,
            amount_match,
            amount_difference,
            max_evidence_amount,
            transcript_score: transcript_score(transcript_len),
            transcript_len,
            notes,
        }
    }

    pub fn total(&self) -> i32 {
        i32::from(self.evidence_score) + self.match_score + self.transcript_score
    }
}

/// First digit run in a claim value, separators removed. 0 when absent.
pub fn claim_amount(value: &str) -> u64 {
    DIGIT_RUN
        .find(value)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}

fn claim_type(claim: &str) -> ClaimType {
    let lower = claim.to_lowercase();
    CLAIM_FAMILIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ClaimType::General)
}

fn transcript_score(len: usize) -> i32 {
    match len {
        n if n > 200 => 2,
        80..=200 => 1,
        n if n < 50 => -2,
        _ => 0,
    }
}
