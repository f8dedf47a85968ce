//! Intent parsing: free-text testimony to a structured intent.
//!
//! The deterministic [`FallbackParser`] is always available. The runtime
//! crate wraps it with an optional live parsing service and returns a
//! [`ParseResult`] tagged with the path that produced it.

mod fallback;
pub mod patterns;

pub use fallback::{FallbackParser, FixedClock, ParseClock, SystemClock};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::hashing::{self, Digest};

/// Language of the testimony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Ta,
    Unknown,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ta => "ta",
            Language::Unknown => "unknown",
        }
    }

    /// Parse a language code; unrecognized codes map to `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "en" => Language::En,
            "hi" => Language::Hi,
            "ta" => Language::Ta,
            _ => Language::Unknown,
        }
    }
}

/// Currency of a parsed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Inr,
    Eth,
    Shm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub value: f64,
    pub currency: Currency,
}

/// Which side of the exchange a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartyRole {
    Client,
    Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentParty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub role: PartyRole,
}

/// Raw spans the structured fields were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_source: Option<String>,
}

/// Structured representation of a testimony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub raw_text: String,
    pub normalized_text: String,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub parties: Vec<IntentParty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Calibration heuristic in [0, 1], not a statistical estimate.
    pub confidence: f64,
    #[serde(default)]
    pub extraction: Extraction,
}

/// Which path produced a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParseMode {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub mode: ParseMode,
    pub intent: ParsedIntent,
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content-addressed key of a case: SHA-256 over the normalized testimony.
pub fn intent_digest(text: &str) -> Digest {
    hashing::digest_text(&normalize(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  I   paid\n\tAnil  "), "I paid Anil");
    }

    #[test]
    fn test_intent_digest_ignores_spacing() {
        assert_eq!(intent_digest("I paid  Anil"), intent_digest(" I paid\nAnil "));
        assert_ne!(intent_digest("I paid Anil"), intent_digest("I paid Ravi"));
        assert_eq!(
            intent_digest("I paid Anil"),
            hashing::digest_text("I paid Anil")
        );
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("HI"), Language::Hi);
        assert_eq!(Language::from_code("fr"), Language::Unknown);
        assert_eq!(Language::Ta.code(), "ta");
    }

    #[test]
    fn test_parse_mode_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ParseMode::Live).unwrap(), "\"LIVE\"");
        assert_eq!(
            serde_json::to_string(&ParseMode::Fallback).unwrap(),
            "\"FALLBACK\""
        );
    }
}
