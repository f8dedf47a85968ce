//! Validation of decisions returned by an external reasoning service.
//!
//! Responses are checked against spec/decision.schema.json and then again
//! field by field. Anything that fails is rejected; the caller falls back to
//! the deterministic verdict.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Decision;

/// Embedded decision schema (loaded at compile time).
const DECISION_SCHEMA_JSON: &str = include_str!("../../../../spec/decision.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

pub const MIN_RATIONALE: usize = 2;
pub const MAX_RATIONALE: usize = 10;

/// Why an external decision was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Failed to load decision schema: {0}")]
    SchemaLoad(String),

    #[error("Response is not valid JSON: {0}")]
    Malformed(String),

    #[error("Response violates decision schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("Rationale must have 2-10 string entries, got {0}")]
    InvalidRationale(usize),
}

/// A file reference cited by the external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub file: String,
    #[serde(rename = "quoteOrField")]
    pub quote_or_field: String,
}

/// A validated external decision. Confidence is already rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDecision {
    pub decision: Decision,
    pub confidence: u8,
    pub rationale: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

fn get_validator() -> Result<&'static jsonschema::Validator, DecisionError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(DECISION_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(DecisionError::SchemaLoad(e.clone())),
    }
}

/// Validate a decision object against the schema.
pub fn validate_decision_schema(value: &serde_json::Value) -> Result<(), DecisionError> {
    let validator = get_validator()?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DecisionError::Schema(errors))
    }
}

/// Remove a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and validate raw service output.
pub fn parse_decision(raw: &str) -> Result<ExternalDecision, DecisionError> {
    let value: serde_json::Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| DecisionError::Malformed(e.to_string()))?;

    validate_decision_schema(&value)?;

    let decision = match value.get("decision").and_then(|d| d.as_str()) {
        Some("APPROVE") => Decision::Approve,
        Some("PARTIAL") => Decision::Partial,
        Some("REJECT") => Decision::Reject,
        other => {
            return Err(DecisionError::InvalidDecision(
                other.unwrap_or("<missing>").to_string(),
            ))
        }
    };

    let confidence = match value.get("confidence").and_then(|c| c.as_f64()) {
        Some(c) if c.is_finite() && (0.0..=100.0).contains(&c) => c.round() as u8,
        _ => {
            return Err(DecisionError::InvalidConfidence(
                value
                    .get("confidence")
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "<missing>".to_string()),
            ))
        }
    };

    let rationale: Vec<String> = value
        .get("rationale")
        .and_then(|r| r.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let entry_count = value
        .get("rationale")
        .and_then(|r| r.as_array())
        .map_or(0, Vec::len);
    if rationale.len() != entry_count || !(MIN_RATIONALE..=MAX_RATIONALE).contains(&entry_count) {
        return Err(DecisionError::InvalidRationale(entry_count));
    }

    let citations = value
        .get("citations")
        .cloned()
        .map(serde_json::from_value::<Vec<Citation>>)
        .transpose()
        .map_err(|e| DecisionError::Malformed(e.to_string()))?
        .unwrap_or_default();

    Ok(ExternalDecision {
        decision,
        confidence,
        rationale,
        citations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "decision": "APPROVE",
        "confidence": 87.6,
        "rationale": ["Invoice INV-1 matches the claim", "Amount ₹4,500 is documented"],
        "citations": [{"file": "bill.pdf", "quoteOrField": "INV-1"}]
    }"#;

    #[test]
    fn test_valid_decision_parses() {
        let d = parse_decision(VALID).unwrap();
        assert_eq!(d.decision, Decision::Approve);
        assert_eq!(d.confidence, 88);
        assert_eq!(d.rationale.len(), 2);
        assert_eq!(d.citations[0].quote_or_field, "INV-1");
    }

    #[test]
    fn test_fenced_response_is_accepted() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_decision(&fenced).is_ok());
        let bare_fence = format!("```\n{}\n```", VALID);
        assert!(parse_decision(&bare_fence).is_ok());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let raw = r#"{"decision": "APPROVE", "confidence": 150, "rationale": ["a", "b"]}"#;
        assert!(matches!(
            parse_decision(raw),
            Err(DecisionError::Schema(_))
        ));
        let negative = r#"{"decision": "REJECT", "confidence": -1, "rationale": ["a", "b"]}"#;
        assert!(parse_decision(negative).is_err());
    }

    #[test]
    fn test_confidence_must_be_number() {
        let raw = r#"{"decision": "APPROVE", "confidence": "90", "rationale": ["a", "b"]}"#;
        assert!(parse_decision(raw).is_err());
    }

    #[test]
    fn test_unknown_decision_rejected() {
        let raw = r#"{"decision": "MAYBE", "confidence": 50, "rationale": ["a", "b"]}"#;
        assert!(parse_decision(raw).is_err());
    }

    #[test]
    fn test_rationale_bounds() {
        let one = r#"{"decision": "PARTIAL", "confidence": 60, "rationale": ["only"]}"#;
        assert!(parse_decision(one).is_err());

        let eleven: Vec<String> = (0..11).map(|i| format!("r{}", i)).collect();
        let raw = serde_json::json!({
            "decision": "PARTIAL", "confidence": 60, "rationale": eleven
        })
        .to_string();
        assert!(parse_decision(&raw).is_err());

        let ten: Vec<String> = (0..10).map(|i| format!("r{}", i)).collect();
        let raw = serde_json::json!({
            "decision": "PARTIAL", "confidence": 60, "rationale": ten
        })
        .to_string();
        assert!(parse_decision(&raw).is_ok());
    }

    #[test]
    fn test_prose_response_rejected() {
        assert!(matches!(
            parse_decision("I think the claim should be approved."),
            Err(DecisionError::Malformed(_))
        ));
    }

    #[test]
    fn test_strip_fences_passthrough() {
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_fences("```json\n{}\n```"), "{}");
    }
}
