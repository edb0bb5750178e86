// Plan engine - decomposes goals and drives plans through the confirmation gate
//
// The engine never executes anything. It hands out one step at a time, and
// the caller reports the gate decision and the execution outcome back.

use std::sync::Arc;

use super::decomposer::{parse_plan_response, plan_request, DraftStep};
use super::plan::Plan;
use super::types::{Decision, GatePolicy, OnFailure, PlanError, PlanProgress, StepOutcome, StepStatus};
use crate::context::SystemInfo;
use crate::providers::{GenerationSettings, Orchestrator};
use crate::safety::RiskClassifier;

pub struct PlanEngine {
    orchestrator: Arc<Orchestrator>,
    classifier: RiskClassifier,
    policy: GatePolicy,
    settings: GenerationSettings,
    system: SystemInfo,
}

impl PlanEngine {
    pub fn new(orchestrator: Arc<Orchestrator>, classifier: RiskClassifier, policy: GatePolicy) -> Self {
        Self {
            orchestrator,
            classifier,
            policy,
            settings: GenerationSettings::default(),
            system: SystemInfo::detect(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_system(mut self, system: SystemInfo) -> Self {
        self.system = system;
        self
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Ask the routed model for a step list and build a Ready plan from it.
    pub async fn decompose(&self, goal: &str) -> Result<Plan, PlanError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(PlanError::Decomposition("goal is empty".to_string()));
        }

        let request = plan_request(&self.settings, &self.system, goal);
        let routed = self.orchestrator.complete(&request).await?;
        tracing::debug!("Plan response from {} ({} chars)", routed.backend, routed.value.len());

        let draft = parse_plan_response(&routed.value)?;
        let plan = self.plan_from_steps(goal, draft.steps, draft.notes)?;
        tracing::info!(
            "Decomposed goal into {} step(s) via {} (plan {})",
            plan.steps().len(),
            routed.backend,
            plan.id()
        );
        Ok(plan)
    }

    /// Build a Ready plan from already-known steps. Each step is classified
    /// once here; its assessment and gate never change afterwards.
    pub fn plan_from_steps(
        &self,
        goal: &str,
        steps: Vec<DraftStep>,
        notes: Option<String>,
    ) -> Result<Plan, PlanError> {
        let mut plan = Plan::new(goal, notes);
        for step in steps {
            let command = step.command.trim();
            if command.is_empty() {
                continue;
            }
            self.push_classified(&mut plan, step.description, command.to_string(), None);
        }
        if plan.steps().is_empty() {
            return Err(PlanError::Decomposition("plan has no valid commands".to_string()));
        }
        plan.mark_ready();
        Ok(plan)
    }

    /// Next step with its gate, or the final summary.
    pub fn advance(&self, plan: &mut Plan) -> Result<PlanProgress, PlanError> {
        plan.advance()
    }

    pub fn mark(&self, plan: &mut Plan, ordinal: usize, decision: Decision) -> Result<(), PlanError> {
        plan.mark(ordinal, decision)
    }

    pub fn record_outcome(
        &self,
        plan: &mut Plan,
        ordinal: usize,
        outcome: StepOutcome,
        on_failure: OnFailure,
    ) -> Result<(), PlanError> {
        plan.record_outcome(ordinal, outcome, on_failure)
    }

    /// Append a fresh Pending copy of a failed step and return its ordinal.
    ///
    /// The failed step stays in the ledger untouched. The copy is classified
    /// again, so a changed rule table or policy applies to it.
    pub fn append_retry(&self, plan: &mut Plan, ordinal: usize) -> Result<usize, PlanError> {
        if plan.is_finished() {
            return Err(if plan.state() == super::types::PlanState::Aborted {
                PlanError::Aborted
            } else {
                PlanError::Finished
            });
        }
        let failed = plan.step(ordinal).ok_or(PlanError::UnknownStep(ordinal))?;
        if failed.status != StepStatus::Failed {
            return Err(PlanError::InvalidTransition {
                ordinal,
                from: failed.status,
                to: StepStatus::Pending,
            });
        }

        let description = failed.description.clone();
        let command = failed.command.clone();
        let new_ordinal = self.push_classified(plan, description, command, Some(ordinal));
        tracing::info!("Plan {} step {} retries step {}", plan.id(), new_ordinal, ordinal);
        Ok(new_ordinal)
    }

    pub fn abort(&self, plan: &mut Plan) -> Result<(), PlanError> {
        plan.abort()
    }

    // ── Private helpers ──

    fn push_classified(
        &self,
        plan: &mut Plan,
        description: String,
        command: String,
        retry_of: Option<usize>,
    ) -> usize {
        let assessment = self.classifier.classify(&command);
        let gate = self.policy.gate_for(&assessment);
        tracing::debug!("Plan step `{}`: {} ({:?})", command, assessment.tier, gate);
        plan.push_step(description, command, assessment, gate, retry_of)
    }
}
