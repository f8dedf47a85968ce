//! Prompts for the external reasoning service.
//!
//! The system prompt is fixed. The user prompt carries only what the rules
//! engine also sees: the structured claim, a bounded testimony excerpt, the
//! structured fields and a bounded summary line for each evidence file, and
//! the rule signals. Raw document text is never sent.

use verba_core::{EvidenceItem, RuleSignals, StructuredIntent};

/// Testimony characters included before truncation.
pub const MAX_TESTIMONY_CHARS: usize = 2000;

/// Evidence summary characters included per file.
pub const MAX_SUMMARY_CHARS: usize = 200;

/// Frames the service as a judge bound to the supplied record.
pub const ADJUDICATION_SYSTEM_PROMPT: &str = r#"
You are a legal judge evaluating a dispute case. Your task is to render a verdict based on the provided testimony and evidence.

CRITICAL INSTRUCTIONS:
1. Do NOT invent evidence. Only reference what is provided in the case record.
2. Every rationale bullet MUST reference either:
   - A specific quote from the testimony, OR
   - An evidence file field (invoice number, amount, date, party name)
3. If evidence is weak or missing, choose PARTIAL or REJECT and explicitly state what is missing.
4. Confidence should reflect the strength of evidence:
   - APPROVE: 75-95% (strong evidence, clear match)
   - PARTIAL: 50-74% (moderate evidence, some gaps)
   - REJECT: 30-55% (weak/no evidence, contradictions)
5. Be concise and authoritative. Use legal language but remain clear.

OUTPUT FORMAT (JSON only):
{
  "decision": "APPROVE" | "PARTIAL" | "REJECT",
  "confidence": <number 0-100>,
  "rationale": [
    "<bullet 1 citing evidence>",
    "<bullet 2 citing evidence>",
    "<bullet 3 citing evidence>"
  ],
  "citations": [
    {"file": "<filename>", "quoteOrField": "<invoice number/amount/quote>"}
  ]
}

Respond with ONLY valid JSON, no other text.
"#;

/// Build the case record sent as the user message.
pub fn build_adjudication_prompt(
    transcript: &str,
    claim: &StructuredIntent,
    items: &[EvidenceItem],
    signals: &RuleSignals,
) -> String {
    format!(
        "CASE SUMMARY:\n\
         - Actor: {actor}\n\
         - Claim: {claim}\n\
         - Amount: {amount}\n\
         - Context: {context}\n\
         \n\
         TESTIMONY:\n\
         {testimony}\n\
         \n\
         EVIDENCE FILES:\n\
         {evidence}\n\
         \n\
         RULE-BASED SIGNALS:\n\
         {signals}\n",
        actor = claim.actor,
        claim = claim.claim,
        amount = claim.value.as_deref().unwrap_or("Not specified"),
        context = claim.context,
        testimony = truncate_chars(transcript, MAX_TESTIMONY_CHARS),
        evidence = evidence_summary(items),
        signals = signal_summary(signals),
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn evidence_summary(items: &[EvidenceItem]) -> String {
    if items.is_empty() {
        return "No evidence files provided".to_string();
    }

    items
        .iter()
        .map(|item| {
            let mut parts = Vec::new();
            if let Some(fields) = item.fields() {
                if let Some(invoice) = &fields.invoice_number {
                    parts.push(format!("Invoice: {}", invoice));
                }
                if let Some(date) = &fields.date {
                    parts.push(format!("Date: {}", date));
                }
                if let (Some(amount), Some(currency)) = (&fields.amount, &fields.currency) {
                    parts.push(format!("Amount: {}{}", currency, amount));
                }
                if !fields.parties.is_empty() {
                    parts.push(format!("Parties: {}", fields.parties.join(", ")));
                }
                if !fields.keywords.is_empty() {
                    parts.push(format!("Keywords: {}", fields.keywords.join(", ")));
                }
            }
            let detail = if parts.is_empty() {
                "No structured fields detected".to_string()
            } else {
                parts.join(" | ")
            };
            match item.extracted.as_ref().map(|e| e.summary.trim()) {
                Some(summary) if !summary.is_empty() => format!(
                    "File: {}\n{}\nSummary: {}",
                    item.filename,
                    detail,
                    truncate_chars(summary, MAX_SUMMARY_CHARS)
                ),
                _ => format!("File: {}\n{}", item.filename, detail),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn signal_summary(signals: &RuleSignals) -> String {
    let mut lines = vec![format!("Evidence Strength: {}/10", signals.evidence_score)];
    lines.push(if signals.amount_match {
        "Claimed amount matches evidence".to_string()
    } else {
        "Claimed amount does not match evidence".to_string()
    });
    if !signals.notes.is_empty() {
        lines.push(format!("Missing: {}", signals.notes.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use verba_core::{compile, DetectedFields, ExtractedEvidence};

    fn claim() -> StructuredIntent {
        compile(
            "I paid ₹5000 to Sharma Electronics for a refrigerator that never arrived",
            Some("consumer"),
            None,
        )
        .unwrap()
    }

    fn invoice_item() -> EvidenceItem {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        EvidenceItem::from_upload("invoice.txt", "text/plain", b"INV-1001 5000", at).with_extracted(
            ExtractedEvidence {
                fields: DetectedFields {
                    invoice_number: Some("INV-1001".into()),
                    date: Some("01/03/2024".into()),
                    amount: Some("5000".into()),
                    currency: Some("₹".into()),
                    parties: vec!["Sharma Electronics".into()],
                    keywords: vec![],
                },
                summary: "Tax invoice for one refrigerator".into(),
            },
        )
    }

    #[test]
    fn test_system_prompt_forbids_invention() {
        assert!(ADJUDICATION_SYSTEM_PROMPT.contains("Do NOT invent evidence"));
        assert!(ADJUDICATION_SYSTEM_PROMPT.contains("\"decision\""));
        assert!(ADJUDICATION_SYSTEM_PROMPT.contains("ONLY valid JSON"));
    }

    #[test]
    fn test_prompt_includes_fields_and_summary() {
        let claim = claim();
        let items = vec![invoice_item()];
        let transcript = "I paid ₹5000 and the refrigerator never arrived at my home.";
        let signals = RuleSignals::compute(transcript, &claim, &items);
        let prompt = build_adjudication_prompt(transcript, &claim, &items, &signals);

        assert!(prompt.contains("- Actor: User"));
        assert!(prompt.contains("- Amount: ₹5000"));
        assert!(prompt.contains(
            "File: invoice.txt\n\
             Invoice: INV-1001 | Date: 01/03/2024 | Amount: ₹5000 | Parties: Sharma Electronics\n\
             Summary: Tax invoice for one refrigerator"
        ));
        assert!(prompt.contains("Evidence Strength: 7/10"));
        assert!(prompt.contains("Claimed amount matches evidence"));
    }

    #[test]
    fn test_long_summary_is_bounded() {
        let mut item = invoice_item();
        if let Some(extracted) = item.extracted.as_mut() {
            extracted.summary = "x".repeat(MAX_SUMMARY_CHARS * 3);
        }
        let summary = evidence_summary(&[item]);
        let line = summary.lines().last().unwrap();
        assert_eq!(line, format!("Summary: {}...", "x".repeat(MAX_SUMMARY_CHARS)));
    }

    #[test]
    fn test_prompt_without_evidence() {
        let claim = claim();
        let signals = RuleSignals::compute("short", &claim, &[]);
        let prompt = build_adjudication_prompt("short", &claim, &[], &signals);

        assert!(prompt.contains("EVIDENCE FILES:\nNo evidence files provided"));
        assert!(prompt.contains("Missing: "));
        assert!(prompt.contains("No evidence files provided"));
    }

    #[test]
    fn test_testimony_truncated() {
        let long = "a".repeat(MAX_TESTIMONY_CHARS + 10);
        let cut = truncate_chars(&long, MAX_TESTIMONY_CHARS);
        assert_eq!(cut.chars().count(), MAX_TESTIMONY_CHARS + 3);
        assert!(cut.ends_with("..."));

        let short = "ज".repeat(10);
        assert_eq!(truncate_chars(&short, MAX_TESTIMONY_CHARS), short);
    }
}
