//! # verba-core
//!
//! Deterministic case processing: testimony in, adjudicated and hashed
//! settlement out.
//!
//! This crate answers, for a single case:
//! - What is being claimed, for how much, against whom?
//! - How well does the sealed evidence support it?
//! - What should happen to the funds?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same testimony, evidence and clock give the same output
//! 2. **No I/O**: network calls live in `verba-runtime`
//! 3. **Content-addressed**: claims, evidence sets and agreements carry SHA-256 digests
//! 4. **Ordered**: a case moves through its stages strictly in sequence
//!
//! ## Example
//!
//! ```rust,ignore
//! use verba_core::{Case, Testimony, TestimonyMode};
//!
//! let mut case = Case::new();
//! case.begin()?;
//! case.submit_testimony(Testimony::new(TestimonyMode::Text, text)?)?;
//! case.structure_claim()?;
//! case.seal_evidence(chrono::Utc::now())?;
//! let outcome = case.adjudicate_rules()?;
//! println!("{} ({}%)", outcome.verdict().decision, outcome.verdict().confidence);
//! ```

pub mod adjudication;
pub mod agreement;
pub mod claim;
pub mod evidence;
pub mod hashing;
pub mod intent;
pub mod pipeline;

// Re-export main types at crate root
pub use adjudication::{
    adjudicate_rules, parse_decision, Decision, DecisionError, Engine, EngineMode,
    EngineOutcome, ExternalDecision, RuleSignals, SettlementRequest, Verdict,
};
pub use agreement::Agreement;
pub use claim::{compile, ClaimError, ClaimType, StructuredIntent};
pub use evidence::{
    strength, DetectedFields, EvidenceDraft, EvidenceItem, ExtractedEvidence, FieldExtractor,
    PlainTextExtractor, SealedEvidence,
};
pub use hashing::{aggregate_root, digest, Digest, DigestKind, HashError};
pub use intent::{
    intent_digest, FallbackParser, Language, ParseClock, ParseMode, ParseResult, ParsedIntent,
    SystemClock,
};
pub use pipeline::{
    Case, OutcomeRecord, Pipeline, PipelineError, Stage, StagePayload, StageStatus, Testimony,
    TestimonyMode, Transition,
};
