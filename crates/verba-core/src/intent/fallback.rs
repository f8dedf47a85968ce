//! Deterministic intent parser. Regex tables plus heuristics, no I/O.

use chrono::{DateTime, Duration, FixedOffset, Local, Timelike};

use super::patterns::{
    DeadlineRule, AMOUNT_PATTERNS, CONDITION_PATTERNS, DEADLINE_PATTERNS, DEVANAGARI,
    PARTY_PATTERNS, PROVIDER_MARKERS, TAMIL, TASK_FAMILIES,
};
use super::{
    normalize, Currency, Extraction, IntentParty, Language, Money, ParsedIntent, PartyRole,
};

const BASE_CONFIDENCE: f64 = 0.4;
const CONFIDENCE_CEILING: f64 = 0.95;

/// Source of "now" for relative deadlines.
pub trait ParseClock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ParseClock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A frozen clock, for reproducible parses.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl ParseClock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Rule-based parser that is always available.
#[derive(Debug, Clone, Default)]
pub struct FallbackParser<C = SystemClock> {
    clock: C,
}

impl FallbackParser<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: ParseClock> FallbackParser<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Parse testimony into a structured intent.
    ///
    /// A language hint wins over script detection. Identical input and clock
    /// readings always yield identical output.
    pub fn parse(&self, text: &str, hint: Option<Language>) -> ParsedIntent {
        let language = hint.unwrap_or_else(|| detect_language(text));
        let (amount, amount_source) = extract_amount(text).unzip();
        let (deadline, deadline_source) = extract_deadline(text, self.clock.now()).unzip();
        let (parties, party_source) = extract_parties(text);
        let task = classify_task(text);
        let conditions = extract_conditions(text);

        let mut confidence = BASE_CONFIDENCE;
        if amount.is_some() {
            confidence += 0.2;
        }
        if deadline.is_some() {
            confidence += 0.2;
        }
        if !parties.is_empty() {
            confidence += 0.2;
        }
        if task.is_some() {
            confidence += 0.1;
        }

        ParsedIntent {
            raw_text: text.to_string(),
            normalized_text: normalize(text),
            language,
            task,
            parties,
            amount,
            deadline,
            duration_hours: None,
            conditions,
            confidence: confidence.min(CONFIDENCE_CEILING),
            extraction: Extraction {
                amount_source,
                deadline_source,
                party_source,
            },
        }
    }
}

fn detect_language(text: &str) -> Language {
    if DEVANAGARI.is_match(text) {
        Language::Hi
    } else if TAMIL.is_match(text) {
        Language::Ta
    } else {
        Language::En
    }
}

fn extract_amount(text: &str) -> Option<(Money, String)> {
    for pattern in AMOUNT_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let value = match caps[1].replace(',', "").parse::<f64>() {
            Ok(v) if v > 0.0 => v,
            _ => continue,
        };
        let span = caps[0].to_uppercase();
        let currency = if span.contains("ETH") {
            Currency::Eth
        } else if span.contains("SHM") || span.contains("SHARDEUM") {
            Currency::Shm
        } else {
            Currency::Inr
        };
        return Some((Money { value, currency }, caps[0].trim().to_string()));
    }
    None
}

fn extract_deadline(
    text: &str,
    now: DateTime<FixedOffset>,
) -> Option<(DateTime<FixedOffset>, String)> {
    for (pattern, rule) in DEADLINE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let target = match rule {
            DeadlineRule::DaysFromNow(days) => {
                Duration::try_days(*days).and_then(|d| now.checked_add_signed(d))
            }
            // Offsets past chrono's range yield no deadline.
            DeadlineRule::InHours => caps[1]
                .parse::<i64>()
                .ok()
                .and_then(Duration::try_hours)
                .and_then(|h| now.checked_add_signed(h)),
            DeadlineRule::InDays => caps[1]
                .parse::<i64>()
                .ok()
                .and_then(Duration::try_days)
                .and_then(|d| now.checked_add_signed(d)),
            DeadlineRule::TimeOfDay => {
                let hour: u32 = caps[1].parse().ok()?;
                let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
                let pm = caps
                    .get(3)
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case("pm"));
                let hour = if pm && hour < 12 { hour + 12 } else { hour };
                now.with_hour(hour)
                    .and_then(|t| t.with_minute(minute))
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
            }
        };
        if let Some(target) = target {
            return Some((target, caps[0].to_string()));
        }
    }
    None
}

fn extract_parties(text: &str) -> (Vec<IntentParty>, Option<String>) {
    let mut parties: Vec<IntentParty> = Vec::new();
    let mut source = None;

    for pattern in PARTY_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let name = caps[1].trim();
            let len = name.chars().count();
            if len <= 2 || len >= 50 || parties.iter().any(|p| p.name.as_deref() == Some(name)) {
                continue;
            }
            let span = caps[0].to_lowercase();
            let role = if PROVIDER_MARKERS.iter().any(|m| span.contains(m)) {
                PartyRole::Provider
            } else {
                PartyRole::Client
            };
            parties.push(IntentParty {
                name: Some(name.to_string()),
                address: None,
                role,
            });
            if source.is_none() {
                source = Some(caps[0].trim().to_string());
            }
        }
    }

    (parties, source)
}

fn classify_task(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    TASK_FAMILIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| upper.contains(&kw.to_uppercase())))
        .map(|(_, task)| task.to_string())
}

fn extract_conditions(text: &str) -> Vec<String> {
    CONDITION_PATTERNS
        .iter()
        .flat_map(|p| p.captures_iter(text))
        .map(|caps| caps[1].trim().to_string())
        .filter(|c| {
            let len = c.chars().count();
            len > 5 && len < 100
        })
        .collect()
}
