// Plan types: step status, gates, decisions, errors

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::providers::RouteError;
use crate::safety::{RiskAssessment, RiskTier};

/// Lifecycle of one step. Strictly forward:
/// `Pending → Confirmed | Skipped`, `Confirmed → Executed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Confirmed,
    Skipped,
    Executed,
    Failed,
}

impl StepStatus {
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Skipped)
                | (Self::Confirmed, Self::Executed)
                | (Self::Confirmed, Self::Failed)
        )
    }

    /// No further transitions possible
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Skipped | Self::Executed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Skipped => "skipped",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's answer at the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Skip,
}

impl Decision {
    fn target(self) -> StepStatus {
        match self {
            Self::Confirm => StepStatus::Confirmed,
            Self::Skip => StepStatus::Skipped,
        }
    }
}

impl From<Decision> for StepStatus {
    fn from(d: Decision) -> Self {
        d.target()
    }
}

/// Reported by the external executor after running a confirmed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    Failed,
}

impl From<StepOutcome> for StepStatus {
    fn from(o: StepOutcome) -> Self {
        match o {
            StepOutcome::Executed => Self::Executed,
            StepOutcome::Failed => Self::Failed,
        }
    }
}

/// What a failed step does to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    #[default]
    Abort,
    /// Keep going; the next step is still offered
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Created,
    Ready,
    InProgress,
    Completed,
    Aborted,
}

impl PlanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// How the confirmation gate treats a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Ask the user
    Confirm,
    /// Within the auto-confirm threshold; the caller may confirm without asking
    AutoConfirm,
    /// Refused by policy; the step can only be skipped
    Blocked,
}

/// Maps risk tiers onto gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub block_critical: bool,
    /// Highest tier auto-confirmed (Critical never is)
    pub auto_confirm_max: Option<RiskTier>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            block_critical: true,
            auto_confirm_max: None,
        }
    }
}

impl GatePolicy {
    /// Confirm everything, block nothing (`--no-safety`).
    pub fn permissive() -> Self {
        Self {
            block_critical: false,
            auto_confirm_max: None,
        }
    }

    pub fn gate_for(&self, assessment: &RiskAssessment) -> Gate {
        let tier = assessment.tier;
        if tier == RiskTier::Critical {
            return if self.block_critical {
                Gate::Blocked
            } else {
                Gate::Confirm
            };
        }
        match self.auto_confirm_max {
            Some(max) if tier <= max => Gate::AutoConfirm,
            _ => Gate::Confirm,
        }
    }
}

/// One command of a plan. Everything but `status` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    /// 1-based position in the plan
    pub ordinal: usize,
    pub description: String,
    pub command: String,
    pub assessment: RiskAssessment,
    pub gate: Gate,
    pub status: StepStatus,
    /// Ordinal of the failed step this one retries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<usize>,
}

/// Result of `advance`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanProgress {
    /// Next step awaiting a decision
    Step(PlanStep),
    /// Nothing left to offer; `state` is Completed or Aborted
    Finished(PlanSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub state: PlanState,
    pub total: usize,
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Pending or confirmed without an outcome
    pub outstanding: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} executed, {} failed, {} skipped of {} step(s)",
            self.state, self.executed, self.failed, self.skipped, self.total
        )
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    /// The model's answer could not be turned into a step list
    #[error("could not decompose goal into steps: {0}")]
    Decomposition(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("plan has no step {0}")]
    UnknownStep(usize),

    #[error("step {ordinal} cannot go from {from} to {to}")]
    InvalidTransition {
        ordinal: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("step {ordinal} is not the current step (current: {current})")]
    OutOfOrder { ordinal: usize, current: usize },

    #[error("step {0} is confirmed; record its outcome before advancing")]
    OutcomePending(usize),

    #[error("step {0} is blocked by the safety policy and can only be skipped")]
    Blocked(usize),

    #[error("plan was aborted")]
    Aborted,

    #[error("plan is already complete")]
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::RiskClassifier;

    #[test]
    fn test_status_transitions_forward_only() {
        use StepStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Confirmed.can_transition_to(Executed));
        assert!(Confirmed.can_transition_to(Failed));

        for settled in [Skipped, Executed, Failed] {
            for next in [Pending, Confirmed, Skipped, Executed, Failed] {
                assert!(!settled.can_transition_to(next));
            }
        }
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Executed));
    }

    #[test]
    fn test_gate_policy() {
        let classifier = RiskClassifier::default();
        let safe = classifier.classify("ls");
        let caution = classifier.classify("rm notes.txt");
        let dangerous = classifier.classify("rm -rf build");
        let critical = classifier.classify("rm -rf /");

        let default = GatePolicy::default();
        assert_eq!(default.gate_for(&safe), Gate::Confirm);
        assert_eq!(default.gate_for(&critical), Gate::Blocked);

        let auto = GatePolicy {
            block_critical: true,
            auto_confirm_max: Some(RiskTier::Caution),
        };
        assert_eq!(auto.gate_for(&safe), Gate::AutoConfirm);
        assert_eq!(auto.gate_for(&caution), Gate::AutoConfirm);
        assert_eq!(auto.gate_for(&dangerous), Gate::Confirm);

        let everything = GatePolicy {
            block_critical: false,
            auto_confirm_max: Some(RiskTier::Critical),
        };
        assert_eq!(everything.gate_for(&critical), Gate::Confirm);

        assert_eq!(GatePolicy::permissive().gate_for(&critical), Gate::Confirm);
    }

    #[test]
    fn test_summary_display() {
        let s = PlanSummary {
            state: PlanState::Aborted,
            total: 3,
            executed: 1,
            failed: 1,
            skipped: 0,
            outstanding: 1,
        };
        assert_eq!(s.to_string(), "aborted: 1 executed, 1 failed, 0 skipped of 3 step(s)");
    }
}
