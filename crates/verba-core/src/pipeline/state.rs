//! The stage state machine.
//!
//! Statuses and the view cursor are tracked separately: [`Pipeline::complete`]
//! updates statuses immediately, and [`Pipeline::settle`] moves the cursor
//! onto the newly active stage. Callers decide how long to wait in between.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::case::{OutcomeRecord, Testimony};
use super::{PipelineError, Stage, StageStatus};
use crate::agreement::Agreement;
use crate::adjudication::Verdict;
use crate::claim::StructuredIntent;
use crate::evidence::SealedEvidence;

/// Typed data attached to a completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Landing,
    Intent(Testimony),
    ClaimStructuring(StructuredIntent),
    Evidence(SealedEvidence),
    Adjudication(Verdict),
    Outcome(OutcomeRecord),
    Agreement(Agreement),
}

impl StagePayload {
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::Landing => Stage::Landing,
            StagePayload::Intent(_) => Stage::Intent,
            StagePayload::ClaimStructuring(_) => Stage::ClaimStructuring,
            StagePayload::Evidence(_) => Stage::Evidence,
            StagePayload::Adjudication(_) => Stage::Adjudication,
            StagePayload::Outcome(_) => Stage::Outcome,
            StagePayload::Agreement(_) => Stage::Agreement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
}

impl StageState {
    fn locked() -> Self {
        Self {
            status: StageStatus::Locked,
            payload: None,
        }
    }
}

/// Result of a completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub completed: Stage,
    /// Stage that became active, if any.
    pub next: Option<Stage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    stages: BTreeMap<Stage, StageState>,
    cursor: Stage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Landing active, everything else locked.
    pub fn new() -> Self {
        let mut stages: BTreeMap<Stage, StageState> =
            Stage::ALL.iter().map(|s| (*s, StageState::locked())).collect();
        stages.insert(
            Stage::Landing,
            StageState {
                status: StageStatus::Active,
                payload: None,
            },
        );
        Self {
            stages,
            cursor: Stage::Landing,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages
            .get(&stage)
            .map_or(StageStatus::Locked, |s| s.status)
    }

    pub fn payload(&self, stage: Stage) -> Option<&StagePayload> {
        self.stages.get(&stage).and_then(|s| s.payload.as_ref())
    }

    /// The single active stage, if any stage is still open.
    pub fn active_stage(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .find(|s| self.status(*s) == StageStatus::Active)
    }

    /// Stage currently shown to the user.
    pub fn cursor(&self) -> Stage {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|s| self.status(*s) == StageStatus::Completed)
    }

    /// Complete the active stage with its payload and unlock the next one.
    ///
    /// Nothing changes when the call is rejected.
    pub fn complete(
        &mut self,
        stage: Stage,
        payload: StagePayload,
    ) -> Result<Transition, PipelineError> {
        if payload.stage() != stage {
            return Err(PipelineError::PayloadMismatch {
                expected: stage,
                found: payload.stage(),
            });
        }
        match self.status(stage) {
            StageStatus::Active => {}
            StageStatus::Locked => {
                let reason = match stage.previous() {
                    Some(prev) => format!("{} is not completed", prev),
                    None => "stage is locked".to_string(),
                };
                return Err(PipelineError::precondition(stage, reason));
            }
            StageStatus::Completed => {
                return Err(PipelineError::precondition(
                    stage,
                    "already completed; submit a compensating completion instead",
                ))
            }
        }

        self.stages.insert(
            stage,
            StageState {
                status: StageStatus::Completed,
                payload: Some(payload),
            },
        );
        let next = stage.next();
        if let Some(next) = next {
            if let Some(state) = self.stages.get_mut(&next) {
                state.status = StageStatus::Active;
            }
        }
        tracing::info!(stage = %stage, next = ?next, "Stage completed");
        Ok(Transition {
            completed: stage,
            next,
        })
    }

    /// Replace the payload of a completed stage. Statuses never change.
    ///
    /// Sealed evidence cannot be replaced.
    pub fn compensate(&mut self, payload: StagePayload) -> Result<(), PipelineError> {
        let stage = payload.stage();
        if stage == Stage::Evidence {
            return Err(PipelineError::Sealed(stage));
        }
        match self.stages.get_mut(&stage) {
            Some(state) if state.status == StageStatus::Completed => {
                state.payload = Some(payload);
                tracing::info!(stage = %stage, "Stage payload replaced");
                Ok(())
            }
            _ => Err(PipelineError::precondition(
                stage,
                "only completed stages accept a compensating completion",
            )),
        }
    }

    /// Move the cursor onto the active stage. Returns the new cursor.
    pub fn settle(&mut self) -> Stage {
        if let Some(active) = self.active_stage() {
            self.cursor = active;
        }
        self.cursor
    }

    /// Point the cursor at an active or completed stage.
    pub fn navigate_to(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if self.status(stage) == StageStatus::Locked {
            tracing::warn!(stage = %stage, "Cannot navigate to locked stage");
            return Err(PipelineError::StageLocked(stage));
        }
        self.cursor = stage;
        Ok(())
    }

    /// Back to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
        tracing::info!("Pipeline reset");
    }

    /// At most one stage is active, everything before it is completed and
    /// everything after it is locked.
    pub fn is_consistent(&self) -> bool {
        let statuses: Vec<StageStatus> = Stage::ALL.iter().map(|s| self.status(*s)).collect();
        match statuses.iter().position(|s| *s == StageStatus::Active) {
            Some(i) => {
                statuses[..i].iter().all(|s| *s == StageStatus::Completed)
                    && statuses[i + 1..].iter().all(|s| *s == StageStatus::Locked)
            }
            None => statuses.iter().all(|s| *s == StageStatus::Completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let p = Pipeline::new();
        assert_eq!(p.status(Stage::Landing), StageStatus::Active);
        assert_eq!(p.active_stage(), Some(Stage::Landing));
        assert_eq!(p.cursor(), Stage::Landing);
        for stage in &Stage::ALL[1..] {
            assert_eq!(p.status(*stage), StageStatus::Locked);
        }
        assert!(p.is_consistent());
    }

    #[test]
    fn test_complete_unlocks_next_and_settle_moves_cursor() {
        let mut p = Pipeline::new();
        let t = p.complete(Stage::Landing, StagePayload::Landing).unwrap();
        assert_eq!(t.next, Some(Stage::Intent));
        assert_eq!(p.status(Stage::Landing), StageStatus::Completed);
        assert_eq!(p.status(Stage::Intent), StageStatus::Active);
        assert_eq!(p.cursor(), Stage::Landing);

        assert_eq!(p.settle(), Stage::Intent);
        assert!(p.is_consistent());
    }

    #[test]
    fn test_locked_stage_cannot_complete() {
        let mut p = Pipeline::new();
        let before = p.clone();
        let err = p.complete(Stage::Intent, StagePayload::Landing).unwrap_err();
        assert!(matches!(err, PipelineError::PayloadMismatch { .. }));

        let verdict = Verdict {
            decision: crate::adjudication::Decision::Approve,
            confidence: 80,
            rationale: vec!["a".into(), "b".into()],
            recommended_action: "Approve claim and proceed with settlement".into(),
            reasoning_trace: vec![],
            engine: crate::adjudication::Engine::Rules,
            settlement_ref: None,
        };
        let err = p
            .complete(Stage::Adjudication, StagePayload::Adjudication(verdict))
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::PreconditionNotMet {
                stage: Stage::Adjudication,
                reason: "evidence is not completed".into(),
            }
        );
        assert_eq!(p, before);
    }

    #[test]
    fn test_completed_stage_needs_compensation() {
        let mut p = Pipeline::new();
        p.complete(Stage::Landing, StagePayload::Landing).unwrap();
        let err = p.complete(Stage::Landing, StagePayload::Landing).unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionNotMet { .. }));

        p.compensate(StagePayload::Landing).unwrap();
        assert_eq!(p.status(Stage::Intent), StageStatus::Active);
        assert!(p.is_consistent());
    }

    #[test]
    fn test_compensation_requires_completed_stage() {
        let mut p = Pipeline::new();
        let err = p.compensate(StagePayload::Landing).unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionNotMet { .. }));
    }

    #[test]
    fn test_navigation() {
        let mut p = Pipeline::new();
        assert_eq!(
            p.navigate_to(Stage::Evidence),
            Err(PipelineError::StageLocked(Stage::Evidence))
        );
        p.complete(Stage::Landing, StagePayload::Landing).unwrap();
        p.navigate_to(Stage::Intent).unwrap();
        assert_eq!(p.cursor(), Stage::Intent);
        p.navigate_to(Stage::Landing).unwrap();
        assert_eq!(p.cursor(), Stage::Landing);
    }

    #[test]
    fn test_reset() {
        let mut p = Pipeline::new();
        p.complete(Stage::Landing, StagePayload::Landing).unwrap();
        p.settle();
        p.reset();
        assert_eq!(p, Pipeline::new());
    }

    #[test]
    fn test_serializes_stage_map() {
        let p = Pipeline::new();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["cursor"], "landing");
        assert_eq!(json["stages"]["landing"]["status"], "active");
        assert_eq!(json["stages"]["agreement"]["status"], "locked");
    }
}
