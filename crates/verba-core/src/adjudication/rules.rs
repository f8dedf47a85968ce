//! Deterministic verdict: score bands, rationale templates, recommended action.

use super::signals::RuleSignals;
use super::{Decision, Engine, Verdict};
use crate::evidence::EvidenceItem;

pub const APPROVE_THRESHOLD: i32 = 10;
pub const PARTIAL_THRESHOLD: i32 = 6;
pub const MIN_CONFIDENCE: f64 = 20.0;
pub const MAX_CONFIDENCE: f64 = 95.0;

/// Progress lines shown while a verdict is produced.
pub const REASONING_TRACE: [&str; 3] = [
    "Checking your details...",
    "Reading files...",
    "Preparing outcome...",
];

pub(super) fn decide(signals: &RuleSignals, items: &[EvidenceItem]) -> Verdict {
    let total = signals.total();
    let insight = insights(items).into_iter().next();
    let mut rationale = Vec::new();

    let (decision, raw_confidence) = if total >= APPROVE_THRESHOLD {
        rationale.push("Strong evidence supports the claim.".to_string());
        rationale.extend(insight);
        if let Some(max) = signals.max_evidence_amount.filter(|_| signals.amount_match) {
            rationale.push(format!(
                "Invoice amount ₹{} matches claimed ₹{}",
                format_grouped(max),
                format_grouped(signals.claim_amount as f64)
            ));
        }
        if signals.transcript_len > 200 {
            rationale.push("Detailed testimony provides comprehensive context.".to_string());
        }
        let bonus = (f64::from(total - APPROVE_THRESHOLD) * 3.0).min(15.0);
        (Decision::Approve, 80.0 + bonus)
    } else if total >= PARTIAL_THRESHOLD {
        rationale.push("Moderate evidence provided, but some gaps remain.".to_string());
        rationale.push(insight.unwrap_or_else(|| {
            "Additional documentation may strengthen the case.".to_string()
        }));
        if let Some(max) = signals.max_evidence_amount {
            if !signals.amount_match && signals.claim_amount > 0 {
                rationale.push(format!(
                    "Invoice amount ₹{} differs from claimed ₹{}",
                    format_grouped(max),
                    format_grouped(signals.claim_amount as f64)
                ));
            }
        }
        let bonus = (f64::from(total - PARTIAL_THRESHOLD) * 6.0).min(24.0);
        (Decision::Partial, 55.0 + bonus)
    } else {
        if signals.evidence_score == 0 {
            rationale.push("No evidence provided to support the claim.".to_string());
            rationale.push("No payment proof found (invoice/receipt missing)".to_string());
        } else {
            rationale.push("Insufficient evidence to support the claim.".to_string());
            rationale.extend(insight);
        }
        if signals.transcript_len < 50 {
            rationale.push("Brief testimony lacks sufficient detail.".to_string());
        }
        let bonus = (f64::from(total + 5) * 4.8).min(24.0);
        (Decision::Reject, 30.0 + bonus)
    };

    let confidence = raw_confidence.round().clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as u8;

    tracing::debug!(
        total,
        decision = %decision,
        confidence,
        "Deterministic verdict"
    );

    Verdict {
        decision,
        confidence,
        rationale,
        recommended_action: recommended_action(decision, confidence, signals.claim_amount),
        reasoning_trace: REASONING_TRACE.iter().map(|s| s.to_string()).collect(),
        engine: Engine::Rules,
        settlement_ref: None,
    }
}

/// Concrete observations from extracted fields, in item order then field
/// priority (invoice, amount, date, parties).
pub fn insights(items: &[EvidenceItem]) -> Vec<String> {
    let mut out = Vec::new();
    for item in items {
        let Some(fields) = item.fields() else {
            continue;
        };
        if let Some(invoice) = &fields.invoice_number {
            out.push(format!("Invoice {} detected in {}", invoice, item.filename));
        }
        if let (Some(amount), Some(currency)) = (&fields.amount, &fields.currency) {
            out.push(format!("{} shows amount {}{}", item.filename, currency, amount));
        }
        if let Some(date) = &fields.date {
            out.push(format!("Date {} documented in {}", date, item.filename));
        }
        if !fields.parties.is_empty() {
            out.push(format!("Parties identified: {}", fields.parties.join(", ")));
        }
    }
    out
}

/// Settlement instruction for a decision. Shared by both engines.
pub fn recommended_action(decision: Decision, confidence: u8, claim_amount: u64) -> String {
    match decision {
        Decision::Approve if claim_amount > 0 => format!(
            "Release ₹{} to claimant",
            format_grouped(claim_amount as f64)
        ),
        Decision::Approve => "Approve claim and proceed with settlement".to_string(),
        Decision::Partial if claim_amount > 0 => {
            let partial = u128::from(claim_amount) * u128::from(confidence) / 100;
            format!(
                "Release ₹{} ({}% partial approval)",
                format_grouped(partial as f64),
                confidence
            )
        }
        Decision::Partial => "Approve partial claim pending additional evidence".to_string(),
        Decision::Reject => "Hold funds pending further review".to_string(),
    }
}

/// Comma thousands grouping with up to three fraction digits: `4500.5` → `4,500.5`.
pub fn format_grouped(value: f64) -> String {
    let rendered = format!("{:.3}", value.abs());
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    if value < 0.0 && value.abs() >= 0.0005 {
        grouped.push('-');
    }
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d);
    }
    if !frac_part.is_empty() {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}
