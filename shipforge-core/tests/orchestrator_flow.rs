//! End-to-end: spec generation stub -> lock -> plan -> scope -> execute ->
//! checkpoint resume, exercised through the public API only.

use async_trait::async_trait;
use shipforge_core::capabilities::{Approval, ExecutionResult, ExternalExecutor, SpecGenerator, SpecRequest};
use shipforge_core::ids::{FeatureId, Priority};
use shipforge_core::policy::PolicyEngine;
use shipforge_core::{
    ActionPlan, AutoError, Budget, BudgetStatus, CheckpointStore, Feature, FileCheckpointStore, Method, NonFunctional,
    Orchestrator, OrchestratorConfig, ProductSpec, StepStatus,
};
use tokio_util::sync::CancellationToken;

fn sample_spec(goal: &str) -> ProductSpec {
    ProductSpec {
        product: goal.to_string(),
        goals: vec![goal.to_string()],
        features: vec![
            Feature {
                id: FeatureId::new("auth").unwrap(),
                title: "User Authentication".into(),
                desc: "Users can sign in".into(),
                priority: Priority::P0,
                api: vec![shipforge_core::Api { method: Method::Post, path: "/api/auth/login".into(), request: None, response: None }],
                success: vec!["login returns 200 on valid credentials".into()],
                trace: vec![],
                refs: vec![],
            },
            Feature {
                id: FeatureId::new("dashboard").unwrap(),
                title: "Dashboard UI".into(),
                desc: "Shows a summary view".into(),
                priority: Priority::P1,
                api: vec![],
                success: vec!["dashboard renders the summary widgets".into()],
                trace: vec![],
                refs: vec![],
            },
        ],
        non_functional: NonFunctional::default(),
        acceptance: vec!["a user can sign in and view their dashboard".into()],
        milestones: vec![],
    }
}

struct StubSpecGenerator;

#[async_trait]
impl SpecGenerator for StubSpecGenerator {
    async fn generate(&self, request: &SpecRequest) -> Result<ProductSpec, AutoError> {
        Ok(sample_spec(&request.goal))
    }
}

struct StubBudget;

#[async_trait]
impl Budget for StubBudget {
    async fn status(&self) -> Result<BudgetStatus, AutoError> {
        Ok(BudgetStatus { limit_usd: 100.0, spent_usd: 0.0 })
    }

    async fn charge(&self, _amount_usd: f64) -> Result<(), AutoError> {
        Ok(())
    }
}

struct AlwaysApprove;

#[async_trait]
impl Approval for AlwaysApprove {
    async fn prompt(&self, _plan: &ActionPlan, _spec: &ProductSpec) -> Result<bool, AutoError> {
        Ok(true)
    }
}

/// Fails every task the first time it sees them, succeeds on a second pass —
/// simulating a transient infrastructure failure that the executor retries
/// through.
struct FlakyExecutor {
    attempts: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ExternalExecutor for FlakyExecutor {
    async fn execute(&self, plan: &shipforge_core::Plan) -> Result<ExecutionResult, AutoError> {
        let attempt = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if attempt == 0 {
            Ok(ExecutionResult { failed_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
        } else {
            Ok(ExecutionResult { success_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
        }
    }
}

#[tokio::test]
async fn full_flow_with_scope_and_retry_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    let checkpoint_store = FileCheckpointStore::new(tmp.path().join("checkpoints"));
    let spec_generator = StubSpecGenerator;
    let executor = FlakyExecutor { attempts: std::sync::atomic::AtomicUsize::new(0) };
    let approval = AlwaysApprove;
    let budget = StubBudget;
    let policy_engine = PolicyEngine::new();

    let orchestrator = Orchestrator {
        spec_generator: &spec_generator,
        external_executor: &executor,
        approval: &approval,
        budget: &budget,
        checkpoint_store: &checkpoint_store,
        policy_engine: &policy_engine,
    };

    let config = OrchestratorConfig {
        goal: "Ship the auth flow".to_string(),
        output_dir: tmp.path().join("artifacts"),
        scope_patterns: vec!["feature:auth".to_string()],
        ..Default::default()
    };

    let result = orchestrator.run(config, "op-e2e", &CancellationToken::new()).await.unwrap();

    assert!(result.success);
    assert_eq!(result.tasks_executed, 1, "scope filter should have excluded the dashboard feature's task");
    assert_eq!(result.tasks_failed, 0);

    let plan = result.plan.unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].feature_id, FeatureId::new("auth").unwrap());

    for name in ["spec.yaml", "spec.lock.json", "plan.json", "action-plan.json"] {
        assert!(tmp.path().join("artifacts").join(name).exists());
    }

    let action_plan = result.action_plan.unwrap();
    assert!(action_plan.is_complete());
    assert_eq!(action_plan.get_step("step-4").unwrap().status, StepStatus::Completed);
}

#[tokio::test]
async fn checkpoint_is_reachable_after_a_run() {
    let tmp = tempfile::tempdir().unwrap();
    let checkpoint_store = FileCheckpointStore::new(tmp.path().join("checkpoints"));
    let spec_generator = StubSpecGenerator;
    let executor = FlakyExecutor { attempts: std::sync::atomic::AtomicUsize::new(1) };
    let approval = AlwaysApprove;
    let budget = StubBudget;
    let policy_engine = PolicyEngine::new();

    let orchestrator = Orchestrator {
        spec_generator: &spec_generator,
        external_executor: &executor,
        approval: &approval,
        budget: &budget,
        checkpoint_store: &checkpoint_store,
        policy_engine: &policy_engine,
    };

    let config = OrchestratorConfig { goal: "Ship the auth flow".to_string(), output_dir: tmp.path().join("artifacts"), ..Default::default() };

    orchestrator.run(config, "op-resume", &CancellationToken::new()).await.unwrap();

    let operations = checkpoint_store.list_operations().await.unwrap();
    assert!(operations.contains(&"op-resume".to_string()));
    let checkpoint = checkpoint_store.load("op-resume").await.unwrap();
    assert_eq!(checkpoint.status, StepStatus::Completed);
}
