//! Ordered pattern tables for the fallback intent parser.
//!
//! Order matters in every table: the parser takes the first family that
//! matches.

use lazy_static::lazy_static;
use regex::Regex;

/// How a deadline pattern turns a match into a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineRule {
    /// Fixed number of days from now.
    DaysFromNow(i64),
    /// Capture group 1 holds a number of hours.
    InHours,
    /// Capture group 1 holds a number of days.
    InDays,
    /// Groups 1–3: hour, optional minute, optional am/pm marker.
    TimeOfDay,
}

lazy_static! {
    // =========================================================================
    // AMOUNTS: ₹2000, 2000 rupees, 2,000 INR, 0.1 ETH, 1 SHM, "paid 500"
    // =========================================================================

    pub static ref AMOUNT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(?:₹|INR|RS\.?|rupees?)\s*([\d,]+\.?\d*)").unwrap(),
        Regex::new(r"(?i)([\d,]+\.?\d*)\s*(?:₹|INR|RS\.?|rupees?)").unwrap(),
        Regex::new(r"(?i)([\d,]+\.?\d*)\s*(?:ETH|ethereum)").unwrap(),
        Regex::new(r"(?i)([\d,]+\.?\d*)\s*(?:SHM|shardeum)").unwrap(),
        Regex::new(r"(?i)(?:amount|total|pay|paid|cost|price)\s*:?\s*(?:₹|INR|RS\.?)?\s*([\d,]+\.?\d*)").unwrap(),
    ];

    // =========================================================================
    // DEADLINES
    // =========================================================================

    pub static ref DEADLINE_PATTERNS: Vec<(Regex, DeadlineRule)> = vec![
        (Regex::new(r"(?i)tomorrow").unwrap(), DeadlineRule::DaysFromNow(1)),
        (Regex::new(r"(?i)today").unwrap(), DeadlineRule::DaysFromNow(0)),
        (Regex::new(r"(?i)in\s+(\d+)\s+hours?").unwrap(), DeadlineRule::InHours),
        (Regex::new(r"(?i)in\s+(\d+)\s+days?").unwrap(), DeadlineRule::InDays),
        (Regex::new(r"(?i)by\s+(\d{1,2}):?(\d{2})?\s*(am|pm)?").unwrap(), DeadlineRule::TimeOfDay),
    ];

    // =========================================================================
    // PARTIES: "I pay Anil", "to Rahul", "from Ravi", "seller: ABC Traders"
    // =========================================================================

    pub static ref PARTY_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(?:I|we)\s+(?:pay|paid|give|send)\s+([A-Z][a-zA-Z\s]+)").unwrap(),
        Regex::new(r"(?i)\b(?:to|recipient|buyer|client)\s*:?\s*([A-Z][a-zA-Z\s&]+)").unwrap(),
        Regex::new(r"(?i)\b(?:from|sender|seller|provider|vendor)\s*:?\s*([A-Z][a-zA-Z\s&]+)").unwrap(),
        Regex::new(r"(?i)([A-Z][a-zA-Z\s&]{2,})\s+(?:traders?|company|shop|store|services?)").unwrap(),
    ];

    /// Words in a party match that mark the counterparty as the value provider.
    pub static ref PROVIDER_MARKERS: Vec<&'static str> = vec!["from", "seller", "vendor"];

    // =========================================================================
    // TASKS (keyword families, matched case-insensitively as substrings)
    // =========================================================================

    pub static ref TASK_FAMILIES: Vec<(Vec<&'static str>, &'static str)> = vec![
        (vec!["design", "logo", "poster", "graphic"], "Design work"),
        (vec!["rent", "rental", "lease"], "Rental agreement"),
        (vec!["deliver", "delivery", "ship"], "Delivery service"),
        (vec!["refund", "return", "replace"], "Refund/return"),
        (vec!["wage", "salary", "payment"], "Payment dispute"),
        (vec!["service", "repair", "fix"], "Service provision"),
    ];

    // =========================================================================
    // CONDITIONS
    // =========================================================================

    pub static ref CONDITION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(?:if|when|provided|condition)\s*:?\s*([^.,]+)").unwrap(),
        Regex::new(r"(?i)\b(?:must|should|need|require)\s+([^.,]+)").unwrap(),
    ];

    // =========================================================================
    // SCRIPTS
    // =========================================================================

    pub static ref DEVANAGARI: Regex = Regex::new(r"[\x{0900}-\x{097F}]").unwrap();
    pub static ref TAMIL: Regex = Regex::new(r"[\x{0B80}-\x{0BFF}]").unwrap();
}
