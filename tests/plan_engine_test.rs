// End-to-end plan walks against a scripted backend

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tern::context::SystemInfo;
use tern::planning::{
    Decision, Gate, GatePolicy, OnFailure, PlanEngine, PlanError, PlanProgress, PlanState, StepOutcome,
    StepStatus,
};
use tern::providers::{
    BackendDescriptor, BackendError, BackendKind, GenerationRequest, GenerationResult, LlmProvider,
    Orchestrator, RouteError,
};
use tern::safety::{RiskClassifier, RiskTier};

/// Always healthy, always answers with the same text, remembers what it was asked.
struct ScriptedBackend {
    descriptor: BackendDescriptor,
    name: String,
    reply: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    fn new(reply: &str) -> Arc<Self> {
        let descriptor = BackendDescriptor::new(BackendKind::Ollama, "http://scripted", 0);
        Arc::new(Self {
            name: descriptor.display_name(),
            descriptor,
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(GenerationResult::Complete(self.reply.clone()))
    }
}

const PLAN_JSON: &str = r#"Here is the plan:
```json
{
  "plan": [
    {"thought": "Check the working tree", "cmd": "git status"},
    {"thought": "Remove the stale log", "cmd": "rm build.log"},
    {"thought": "Wipe everything", "cmd": "rm -rf /"},
    {"thought": "List what is left", "cmd": "ls -la"}
  ],
  "notes": "Run from the repository root"
}
```"#;

fn system() -> SystemInfo {
    SystemInfo {
        os: "linux".to_string(),
        arch: "x86_64".to_string(),
        shell: "bash".to_string(),
        cwd: PathBuf::from("/home/dev/project"),
    }
}

fn engine_with(backend: Arc<ScriptedBackend>, policy: GatePolicy) -> PlanEngine {
    let orchestrator = Arc::new(Orchestrator::new(vec![backend as Arc<dyn LlmProvider>]));
    PlanEngine::new(orchestrator, RiskClassifier::default(), policy).with_system(system())
}

fn next_step(engine: &PlanEngine, plan: &mut tern::planning::Plan) -> tern::planning::PlanStep {
    match engine.advance(plan).unwrap() {
        PlanProgress::Step(step) => step,
        PlanProgress::Finished(summary) => panic!("plan finished early: {}", summary),
    }
}

#[tokio::test]
async fn test_decompose_builds_classified_plan() {
    let backend = ScriptedBackend::new(PLAN_JSON);
    let engine = engine_with(Arc::clone(&backend), GatePolicy::default());

    let plan = engine.decompose("  clean up the build  ").await.unwrap();
    assert_eq!(plan.goal(), "clean up the build");
    assert_eq!(plan.notes(), Some("Run from the repository root"));
    assert_eq!(plan.state(), PlanState::Ready);

    let commands: Vec<&str> = plan.steps().iter().map(|s| s.command.as_str()).collect();
    assert_eq!(commands, vec!["git status", "rm build.log", "rm -rf /", "ls -la"]);

    let tiers: Vec<RiskTier> = plan.steps().iter().map(|s| s.assessment.tier).collect();
    assert_eq!(
        tiers,
        vec![RiskTier::Safe, RiskTier::Caution, RiskTier::Critical, RiskTier::Safe]
    );
    assert_eq!(plan.steps()[2].gate, Gate::Blocked);
    assert!(plan.steps().iter().all(|s| s.status == StepStatus::Pending));

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("clean up the build"));
    assert!(requests[0]
        .system_context
        .as_deref()
        .unwrap_or_default()
        .contains("linux"));
}

#[tokio::test]
async fn test_walk_plan_with_blocked_step_and_retry() {
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), GatePolicy::default());
    let mut plan = engine.decompose("clean up the build").await.unwrap();

    // 1: run it
    let step = next_step(&engine, &mut plan);
    assert_eq!(step.ordinal, 1);
    assert_eq!(plan.state(), PlanState::InProgress);
    engine.mark(&mut plan, 1, Decision::Confirm).unwrap();
    engine
        .record_outcome(&mut plan, 1, StepOutcome::Executed, OnFailure::Abort)
        .unwrap();

    // 2: fails, retry appended at the end
    let step = next_step(&engine, &mut plan);
    assert_eq!(step.ordinal, 2);
    engine.mark(&mut plan, 2, Decision::Confirm).unwrap();
    engine
        .record_outcome(&mut plan, 2, StepOutcome::Failed, OnFailure::Continue)
        .unwrap();
    let retry = engine.append_retry(&mut plan, 2).unwrap();
    assert_eq!(retry, 5);

    // 3: blocked, can only be skipped
    let step = next_step(&engine, &mut plan);
    assert_eq!(step.ordinal, 3);
    assert_eq!(step.gate, Gate::Blocked);
    assert!(matches!(
        engine.mark(&mut plan, 3, Decision::Confirm),
        Err(PlanError::Blocked(3))
    ));
    engine.mark(&mut plan, 3, Decision::Skip).unwrap();

    // 4: skipped by the user
    let step = next_step(&engine, &mut plan);
    assert_eq!(step.ordinal, 4);
    engine.mark(&mut plan, 4, Decision::Skip).unwrap();

    // 5: the retry of 2
    let step = next_step(&engine, &mut plan);
    assert_eq!(step.ordinal, 5);
    assert_eq!(step.retry_of, Some(2));
    assert_eq!(step.command, "rm build.log");
    engine.mark(&mut plan, 5, Decision::Confirm).unwrap();
    engine
        .record_outcome(&mut plan, 5, StepOutcome::Executed, OnFailure::Abort)
        .unwrap();

    let summary = match engine.advance(&mut plan).unwrap() {
        PlanProgress::Finished(summary) => summary,
        PlanProgress::Step(step) => panic!("unexpected step {}", step.ordinal),
    };
    assert_eq!(summary.state, PlanState::Completed);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.outstanding, 0);

    // The failed original stays in the ledger
    assert_eq!(plan.step(2).unwrap().status, StepStatus::Failed);
    assert!(matches!(
        engine.mark(&mut plan, 5, Decision::Confirm),
        Err(PlanError::Finished)
    ));
}

#[tokio::test]
async fn test_failure_with_abort_stops_plan() {
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), GatePolicy::default());
    let mut plan = engine.decompose("clean up the build").await.unwrap();

    next_step(&engine, &mut plan);
    engine.mark(&mut plan, 1, Decision::Confirm).unwrap();
    engine
        .record_outcome(&mut plan, 1, StepOutcome::Failed, OnFailure::Abort)
        .unwrap();
    assert_eq!(plan.state(), PlanState::Aborted);

    match engine.advance(&mut plan).unwrap() {
        PlanProgress::Finished(summary) => {
            assert_eq!(summary.state, PlanState::Aborted);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.outstanding, 3);
        }
        PlanProgress::Step(step) => panic!("unexpected step {}", step.ordinal),
    }
    assert!(matches!(
        engine.mark(&mut plan, 2, Decision::Confirm),
        Err(PlanError::Aborted)
    ));
    assert!(matches!(engine.append_retry(&mut plan, 1), Err(PlanError::Aborted)));
}

#[tokio::test]
async fn test_steps_cannot_be_taken_out_of_order() {
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), GatePolicy::default());
    let mut plan = engine.decompose("clean up the build").await.unwrap();

    next_step(&engine, &mut plan);
    assert!(matches!(
        engine.mark(&mut plan, 2, Decision::Confirm),
        Err(PlanError::OutOfOrder { ordinal: 2, current: 1 })
    ));
    assert!(matches!(
        engine.mark(&mut plan, 9, Decision::Confirm),
        Err(PlanError::UnknownStep(9))
    ));

    engine.mark(&mut plan, 1, Decision::Confirm).unwrap();
    assert!(matches!(engine.advance(&mut plan), Err(PlanError::OutcomePending(1))));
}

#[tokio::test]
async fn test_permissive_policy_does_not_block() {
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), GatePolicy::permissive());
    let plan = engine.decompose("clean up the build").await.unwrap();
    assert_eq!(plan.steps()[2].gate, Gate::Confirm);
}

#[tokio::test]
async fn test_auto_confirm_policy() {
    let policy = GatePolicy {
        block_critical: true,
        auto_confirm_max: Some(RiskTier::Safe),
    };
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), policy);
    let plan = engine.decompose("clean up the build").await.unwrap();

    let gates: Vec<Gate> = plan.steps().iter().map(|s| s.gate).collect();
    assert_eq!(
        gates,
        vec![Gate::AutoConfirm, Gate::Confirm, Gate::Blocked, Gate::AutoConfirm]
    );
}

#[tokio::test]
async fn test_unparseable_reply_is_decomposition_error() {
    let engine = engine_with(
        ScriptedBackend::new("Sure! First, check git. Then remove the logs."),
        GatePolicy::default(),
    );
    let err = engine.decompose("clean up").await.unwrap_err();
    assert!(matches!(err, PlanError::Decomposition(_)), "{:?}", err);
}

#[tokio::test]
async fn test_no_backend_is_route_error() {
    let engine = PlanEngine::new(
        Arc::new(Orchestrator::new(Vec::new())),
        RiskClassifier::default(),
        GatePolicy::default(),
    );
    let err = engine.decompose("clean up").await.unwrap_err();
    assert!(matches!(
        err,
        PlanError::Route(RouteError::AllBackendsUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_plan_serializes_for_dry_run() {
    let engine = engine_with(ScriptedBackend::new(PLAN_JSON), GatePolicy::default());
    let plan = engine.decompose("clean up the build").await.unwrap();

    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(value["goal"], "clean up the build");
    assert_eq!(value["steps"].as_array().unwrap().len(), 4);
    assert_eq!(value["steps"][0]["command"], "git status");
    assert!(value["steps"][0].get("retry_of").is_none());
}
