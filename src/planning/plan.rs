// Plan - an append-only ledger of steps walked by a forward-only cursor

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::types::{
    Decision, Gate, OnFailure, PlanError, PlanProgress, PlanState, PlanStep, PlanSummary, StepOutcome,
    StepStatus,
};

/// A decomposed goal.
///
/// Steps are never reordered or removed. The cursor points at the step
/// awaiting a decision or an outcome and only ever moves forward; the plan
/// notices it has run out of steps on the next `advance`, so a retry can still
/// be appended after the last step fails.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    id: Uuid,
    goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    created_at: DateTime<Utc>,
    steps: Vec<PlanStep>,
    #[serde(skip)]
    cursor: usize,
    state: PlanState,
}

impl Plan {
    pub(crate) fn new(goal: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            notes,
            created_at: Utc::now(),
            steps: Vec::new(),
            cursor: 0,
            state: PlanState::Created,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, ordinal: usize) -> Option<&PlanStep> {
        ordinal.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    /// Step under the cursor, if any.
    pub fn current(&self) -> Option<&PlanStep> {
        self.steps.get(self.cursor)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |status: StepStatus| self.steps.iter().filter(|s| s.status == status).count();
        PlanSummary {
            state: self.state,
            total: self.steps.len(),
            executed: count(StepStatus::Executed),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            outstanding: count(StepStatus::Pending) + count(StepStatus::Confirmed),
        }
    }

    // ---- ledger ----

    /// Append a step and return its ordinal.
    pub(crate) fn push_step(
        &mut self,
        description: String,
        command: String,
        assessment: crate::safety::RiskAssessment,
        gate: Gate,
        retry_of: Option<usize>,
    ) -> usize {
        let ordinal = self.steps.len() + 1;
        self.steps.push(PlanStep {
            ordinal,
            description,
            command,
            assessment,
            gate,
            status: StepStatus::Pending,
            retry_of,
        });
        ordinal
    }

    /// Created → Ready once the initial steps are in place.
    pub(crate) fn mark_ready(&mut self) {
        if self.state == PlanState::Created && !self.steps.is_empty() {
            self.state = PlanState::Ready;
        }
    }

    // ---- state machine ----

    /// Offer the step under the cursor.
    ///
    /// A Pending step is returned again until it is marked. A Confirmed step
    /// without an outcome is an error. Terminal plans report their summary.
    pub fn advance(&mut self) -> Result<PlanProgress, PlanError> {
        if self.state.is_terminal() {
            return Ok(PlanProgress::Finished(self.summary()));
        }

        while let Some(step) = self.steps.get(self.cursor) {
            if !step.status.is_settled() {
                break;
            }
            self.cursor += 1;
        }

        let Some(step) = self.steps.get(self.cursor) else {
            self.state = PlanState::Completed;
            tracing::info!("Plan {} completed", self.id);
            return Ok(PlanProgress::Finished(self.summary()));
        };

        match step.status {
            StepStatus::Pending => {
                self.state = PlanState::InProgress;
                Ok(PlanProgress::Step(step.clone()))
            }
            _ => Err(PlanError::OutcomePending(step.ordinal)),
        }
    }

    /// Record the gate decision for the current step.
    pub fn mark(&mut self, ordinal: usize, decision: Decision) -> Result<(), PlanError> {
        self.ensure_open()?;
        let index = self.current_index(ordinal)?;
        let step = &mut self.steps[index];
        let target = StepStatus::from(decision);

        if !step.status.can_transition_to(target) {
            return Err(PlanError::InvalidTransition {
                ordinal,
                from: step.status,
                to: target,
            });
        }
        if decision == Decision::Confirm && step.gate == Gate::Blocked {
            return Err(PlanError::Blocked(ordinal));
        }

        step.status = target;
        tracing::debug!("Plan {} step {} -> {}", self.id, ordinal, target);
        if target.is_settled() {
            self.cursor += 1;
        }
        Ok(())
    }

    /// Record what happened when the confirmed command ran.
    pub fn record_outcome(
        &mut self,
        ordinal: usize,
        outcome: StepOutcome,
        on_failure: OnFailure,
    ) -> Result<(), PlanError> {
        self.ensure_open()?;
        let index = self.current_index(ordinal)?;
        let step = &mut self.steps[index];
        let target = StepStatus::from(outcome);

        if !step.status.can_transition_to(target) {
            return Err(PlanError::InvalidTransition {
                ordinal,
                from: step.status,
                to: target,
            });
        }

        step.status = target;
        self.cursor += 1;

        if outcome == StepOutcome::Failed {
            match on_failure {
                OnFailure::Abort => {
                    self.state = PlanState::Aborted;
                    tracing::warn!("Plan {} aborted: step {} failed", self.id, ordinal);
                }
                OnFailure::Continue => {
                    tracing::info!("Plan {} continuing past failed step {}", self.id, ordinal);
                }
            }
        } else {
            tracing::debug!("Plan {} step {} executed", self.id, ordinal);
        }
        Ok(())
    }

    /// Abort explicitly. Idempotent for aborted plans.
    pub fn abort(&mut self) -> Result<(), PlanError> {
        match self.state {
            PlanState::Completed => Err(PlanError::Finished),
            PlanState::Aborted => Ok(()),
            _ => {
                self.state = PlanState::Aborted;
                tracing::info!("Plan {} aborted by caller", self.id);
                Ok(())
            }
        }
    }

    // ── Private helpers ──

    fn ensure_open(&self) -> Result<(), PlanError> {
        match self.state {
            PlanState::Aborted => Err(PlanError::Aborted),
            PlanState::Completed => Err(PlanError::Finished),
            _ => Ok(()),
        }
    }

    fn current_index(&self, ordinal: usize) -> Result<usize, PlanError> {
        if self.step(ordinal).is_none() {
            return Err(PlanError::UnknownStep(ordinal));
        }
        let index = ordinal - 1;
        if index != self.cursor {
            return Err(PlanError::OutOfOrder {
                ordinal,
                current: self.cursor + 1,
            });
        }
        Ok(index)
    }
}
