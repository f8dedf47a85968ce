//! Case pipeline: a fixed sequence of stages driven by completion calls.
//!
//! ```text
//! Landing → Intent → ClaimStructuring → Evidence → Adjudication → Outcome → Agreement
//! ```
//!
//! [`Pipeline`] is the state machine; [`Case`] owns one and exposes a typed
//! operation per stage.

mod case;
mod state;

pub use case::{Case, OutcomeRecord, Testimony, TestimonyMode, MIN_TESTIMONY_CHARS};
pub use state::{Pipeline, StagePayload, StageState, Transition};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of the case-processing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Landing,
    Intent,
    ClaimStructuring,
    Evidence,
    Adjudication,
    Outcome,
    Agreement,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 7] = [
        Stage::Landing,
        Stage::Intent,
        Stage::ClaimStructuring,
        Stage::Evidence,
        Stage::Adjudication,
        Stage::Outcome,
        Stage::Agreement,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Landing => "landing",
            Stage::Intent => "intent",
            Stage::ClaimStructuring => "claim_structuring",
            Stage::Evidence => "evidence",
            Stage::Adjudication => "adjudication",
            Stage::Outcome => "outcome",
            Stage::Agreement => "agreement",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Locked,
    Active,
    Completed,
}

/// Failures a caller can observe on a stage transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Precondition not met for {stage}: {reason}")]
    PreconditionNotMet { stage: Stage, reason: String },

    #[error("Stage {0} is locked")]
    StageLocked(Stage),

    #[error("Payload for {found} submitted to {expected}")]
    PayloadMismatch { expected: Stage, found: Stage },

    #[error("Stage {0} is sealed and cannot be changed")]
    Sealed(Stage),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub(crate) fn precondition(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::PreconditionNotMet {
            stage,
            reason: reason.into(),
        }
    }
}
