//! Claim compiler: testimony to a content-addressed [`StructuredIntent`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evidence::SealedEvidence;
use crate::hashing::{self, Digest};

/// Claim text is cut to this many characters, ellipsis included.
pub const MAX_CLAIM_CHARS: usize = 200;

const ACTOR: &str = "User";
const CONTEXT: &str = "Legal proceeding";
const UNKNOWN_COUNTERPARTY: &str = "Unknown";

lazy_static! {
    static ref CLAIM_TYPES: Vec<(Regex, ClaimType)> = vec![
        (Regex::new(r"\b(?:refund|return|money back|repayment)\b").unwrap(), ClaimType::Refund),
        (Regex::new(r"\b(?:wage|salary|payment|unpaid|compensation)\b").unwrap(), ClaimType::Wage),
        (Regex::new(r"\b(?:rent|rental|lease|landlord|property)\b").unwrap(), ClaimType::Rental),
        (Regex::new(r"\b(?:service|delivery|contract|agreement|failed)\b").unwrap(), ClaimType::Service),
        (Regex::new(r"\b(?:scam|fraud|deception|cheat)\b").unwrap(), ClaimType::Fraud),
    ];

    static ref VALUE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"₹\s*(\d+(?:,\d{3})*(?:\.\d{2})?)").unwrap(),
        Regex::new(r"\$\s*(\d+(?:,\d{3})*(?:\.\d{2})?)").unwrap(),
        Regex::new(r"(?i)(\d+(?:,\d{3})*(?:\.\d{2})?)\s*(?:rupees|rs|dollars|usd)").unwrap(),
        Regex::new(r"(\d+(?:,\d{3})*(?:\.\d{2})?)").unwrap(),
    ];

    static ref WRITTEN_NUMBERS: Vec<(Regex, &'static str)> = [
        ("one", "1"), ("two", "2"), ("three", "3"), ("four", "4"), ("five", "5"),
        ("six", "6"), ("seven", "7"), ("eight", "8"), ("nine", "9"), ("ten", "10"),
        ("hundred", "100"), ("thousand", "1000"), ("lakh", "100000"),
    ]
    .iter()
    .map(|(word, value)| (Regex::new(&format!(r"(?i)\b{}\b", word)).unwrap(), *value))
    .collect();

    static ref COUNTERPARTY_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\b(?:from|by|with|to)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").unwrap(),
        Regex::new(r"(?i)([A-Z][a-z]+)\s+(?:company|shop|store|merchant|employer)").unwrap(),
    ];
}

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Testimony is empty")]
    EmptyTestimony,

    #[error("Failed to serialize claim: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Dispute category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    Refund,
    Wage,
    Rental,
    Service,
    Fraud,
    General,
}

impl ClaimType {
    /// Classify claim text by the first matching keyword family.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        CLAIM_TYPES
            .iter()
            .find(|(pattern, _)| pattern.is_match(&lower))
            .map(|(_, kind)| *kind)
            .unwrap_or(ClaimType::General)
    }
}

/// Structured claim derived from testimony and sealed evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredIntent {
    pub actor: String,
    pub claim: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub context: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    pub claim_type: ClaimType,
    pub counterparty: String,
    /// SHA-256 over the canonical JSON of every other field.
    pub digest: Digest,
}

/// Hashed body; field order fixes the canonical serialization.
#[derive(Serialize)]
struct ClaimBody<'a> {
    actor: &'a str,
    claim: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    context: &'a str,
    evidence_refs: &'a [String],
    claim_type: ClaimType,
    counterparty: &'a str,
}

impl StructuredIntent {
    /// Recompute the digest from the current fields.
    pub fn compute_digest(&self) -> Result<Digest, ClaimError> {
        let body = ClaimBody {
            actor: &self.actor,
            claim: &self.claim,
            value: self.value.as_deref(),
            context: &self.context,
            evidence_refs: &self.evidence_refs,
            claim_type: self.claim_type,
            counterparty: &self.counterparty,
        };
        Ok(hashing::digest(&serde_json::to_vec(&body)?))
    }

    /// True when the stored digest matches the fields.
    pub fn verify(&self) -> bool {
        self.compute_digest().is_ok_and(|d| d == self.digest)
    }

    pub fn has_evidence(&self) -> bool {
        !self.evidence_refs.is_empty()
    }
}

/// Compile testimony into a structured claim.
pub fn compile(
    testimony: &str,
    case_type: Option<&str>,
    evidence: Option<&SealedEvidence>,
) -> Result<StructuredIntent, ClaimError> {
    let trimmed = testimony.trim();
    if trimmed.is_empty() {
        return Err(ClaimError::EmptyTestimony);
    }

    let context = match case_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(kind) => format!("{} - {}", CONTEXT, kind),
        None => CONTEXT.to_string(),
    };

    let mut intent = StructuredIntent {
        actor: ACTOR.to_string(),
        claim: truncate_claim(trimmed),
        value: extract_value(trimmed).map(|v| format!("₹{}", v)),
        context,
        evidence_refs: evidence.map(SealedEvidence::references).unwrap_or_default(),
        claim_type: ClaimType::detect(trimmed),
        counterparty: extract_counterparty(trimmed),
        digest: Digest::zero(),
    };
    intent.digest = intent.compute_digest()?;
    Ok(intent)
}

fn truncate_claim(text: &str) -> String {
    if text.chars().count() <= MAX_CLAIM_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_CLAIM_CHARS - 3).collect();
    format!("{}...", head)
}

fn extract_value(text: &str) -> Option<String> {
    VALUE_PATTERNS
        .iter()
        .find_map(|p| p.captures(text).map(|c| c[1].replace(',', "")))
        .or_else(|| {
            WRITTEN_NUMBERS
                .iter()
                .find(|(pattern, _)| pattern.is_match(text))
                .map(|(_, value)| value.to_string())
        })
}

fn extract_counterparty(text: &str) -> String {
    COUNTERPARTY_PATTERNS
        .iter()
        .filter_map(|p| p.captures(text))
        .map(|c| c[1].to_string())
        .find(|name| name.chars().count() > 2)
        .unwrap_or_else(|| UNKNOWN_COUNTERPARTY.to_string())
}
