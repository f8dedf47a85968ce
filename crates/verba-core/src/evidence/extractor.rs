//! Structured-field extraction from document text.
//!
//! Extraction is a collaborator: callers may plug in any [`FieldExtractor`].
//! [`PlainTextExtractor`] handles `text/*` documents only; binary formats
//! such as PDF need an external extractor.

use lazy_static::lazy_static;
use regex::Regex;

use super::{DetectedFields, ExtractedEvidence};

lazy_static! {
    static ref INVOICE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(?:INVOICE|INV|BILL)\s*(?:NO|NUMBER|#)?\s*:?\s*([A-Z0-9\-]+)").unwrap(),
        Regex::new(r"(?i)(?:REF|REFERENCE)\s*(?:NO|NUMBER|#)?\s*:?\s*([A-Z0-9\-]+)").unwrap(),
    ];

    static ref DATE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(?:DATE|DATED?)\s*:?\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap(),
        Regex::new(r"(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap(),
    ];

    static ref AMOUNT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(?:AMOUNT|TOTAL|SUM|PAY|PAID)\s*:?\s*(?:₹|INR|RS\.?|USD|\$)\s*([\d,]+\.?\d*)").unwrap(),
        Regex::new(r"(?i)(?:₹|INR|RS\.?|USD|\$)\s*([\d,]+\.?\d*)").unwrap(),
    ];

    static ref INR_MARKER: Regex = Regex::new(r"(?i)₹|\bINR\b|\bRS\b\.?").unwrap();
    static ref USD_MARKER: Regex = Regex::new(r"(?i)\bUSD\b|\$").unwrap();

    static ref PARTY_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(?:FROM|SENDER|BILL *FROM)[ \t]*:?[ \t]*([A-Z][A-Za-z &]+)").unwrap(),
        Regex::new(r"(?i)(?:TO|RECIPIENT|BILL *TO)[ \t]*:?[ \t]*([A-Z][A-Za-z &]+)").unwrap(),
    ];

    static ref KEYWORDS: Vec<&'static str> = vec![
        "PAID", "PAYMENT", "REFUND", "DELIVERED", "SHIPPED", "ORDER",
        "INVOICE", "RECEIPT", "BILL", "CONTRACT", "AGREEMENT", "SALARY", "WAGE",
    ];
}

const PREVIEW_CHARS: usize = 150;

/// Turns document bytes into structured fields.
pub trait FieldExtractor: Send + Sync {
    /// Returns `None` when the document type is not supported.
    fn extract(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> Option<ExtractedEvidence>;
}

/// Regex field detection over plain-text documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Detect fields in already-decoded text.
    pub fn detect(&self, text: &str) -> ExtractedEvidence {
        let fields = detect_fields(text);
        let summary = summarize(text, &fields);
        ExtractedEvidence { fields, summary }
    }
}

impl FieldExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> Option<ExtractedEvidence> {
        let is_text = mime_type.starts_with("text/")
            || filename.to_lowercase().ends_with(".txt");
        if !is_text {
            return None;
        }
        Some(self.detect(&String::from_utf8_lossy(bytes)))
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.captures(text).map(|c| c[1].to_string()))
}

fn detect_fields(text: &str) -> DetectedFields {
    let upper = text.to_uppercase();
    let mut fields = DetectedFields {
        invoice_number: first_capture(&INVOICE_PATTERNS, text),
        date: first_capture(&DATE_PATTERNS, text),
        ..Default::default()
    };

    // The largest amount is usually the total.
    let max_amount = AMOUNT_PATTERNS
        .iter()
        .flat_map(|p| p.captures_iter(text))
        .filter_map(|c| c[1].replace(',', "").parse::<f64>().ok())
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));
    if let Some(amount) = max_amount {
        fields.amount = Some(amount.to_string());
        fields.currency = if INR_MARKER.is_match(text) {
            Some("INR".to_string())
        } else if USD_MARKER.is_match(text) {
            Some("USD".to_string())
        } else {
            None
        };
    }

    for pattern in PARTY_PATTERNS.iter() {
        if let Some(c) = pattern.captures(text) {
            let party = c[1].trim().to_string();
            let len = party.chars().count();
            if len > 2 && len < 50 && !fields.parties.contains(&party) {
                fields.parties.push(party);
            }
        }
    }

    fields.keywords = KEYWORDS
        .iter()
        .filter(|kw| upper.contains(*kw))
        .map(|kw| kw.to_string())
        .collect();

    fields
}

fn summarize(text: &str, fields: &DetectedFields) -> String {
    let mut lines = Vec::new();
    if let Some(invoice) = &fields.invoice_number {
        lines.push(format!("Invoice: {}", invoice));
    }
    if let Some(date) = &fields.date {
        lines.push(format!("Date: {}", date));
    }
    if let Some(amount) = &fields.amount {
        lines.push(format!(
            "Amount: {}{}",
            fields.currency.as_deref().unwrap_or("₹"),
            amount
        ));
    }
    if !fields.parties.is_empty() {
        lines.push(format!("Parties: {}", fields.parties.join(", ")));
    }

    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    let preview = preview.trim();
    if !preview.is_empty() {
        lines.push(format!("Preview: {}...", preview));
    }

    lines.join(" | ")
}
