// Multi-step plans
//
// A goal is decomposed by the routed model into an ordered list of shell
// commands. The engine then walks the plan one step at a time: every step is
// risk-classified, passed through the confirmation gate by the caller, and
// its outcome reported back. Steps are never reordered or retried behind the
// caller's back.

pub mod decomposer;
pub mod engine;
pub mod plan;
pub mod types;

pub use decomposer::{parse_plan_response, DraftPlan, DraftStep};
pub use engine::PlanEngine;
pub use plan::Plan;
pub use types::{
    Decision, Gate, GatePolicy, OnFailure, PlanError, PlanProgress, PlanState, PlanStep, PlanSummary,
    StepOutcome, StepStatus,
};
