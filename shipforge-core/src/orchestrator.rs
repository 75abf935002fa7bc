//! Ties spec generation, locking, plan generation, scoping, persistence,
//! approval, and execution into the end-to-end delivery flow.

use crate::action_plan::{ActionPlan, StepStatus, StepType};
use crate::budget::{check_preflight_budget, Budget};
use crate::capabilities::{Approval, ExternalExecutor, SpecGenerator, SpecRequest};
use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::error::AutoError;
use crate::executor::{ExecutorConfig, ProgressCallback, TaskExecutor};
use crate::generator::{generate_plan, GeneratorOptions};
use crate::ids::TaskId;
use crate::lock::SpecLock;
use crate::persist::write_artifacts;
use crate::plan::Plan;
use crate::policy::{PolicyContext, PolicyEngine};
use crate::scope;
use crate::spec::ProductSpec;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct OrchestratorConfig {
    pub goal: String,
    pub profile: String,
    pub dry_run: bool,
    pub output_dir: PathBuf,
    pub scope_patterns: Vec<String>,
    pub include_dependencies: bool,
    pub executor_config: ExecutorConfig,
    pub cost_limit_usd: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            goal: String::new(),
            profile: "default".to_string(),
            dry_run: false,
            output_dir: PathBuf::from("."),
            scope_patterns: Vec::new(),
            include_dependencies: false,
            executor_config: ExecutorConfig::default(),
            cost_limit_usd: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorResult {
    pub success: bool,
    pub spec: Option<ProductSpec>,
    pub spec_lock: Option<SpecLock>,
    pub plan: Option<Plan>,
    pub action_plan: Option<ActionPlan>,
    pub total_cost_usd: f64,
    pub duration: Duration,
    pub tasks_executed: usize,
    pub tasks_failed: usize,
    pub errors: Vec<String>,
}

/// Borrowed capability bundle. None of these are owned by the orchestrator —
/// they are supplied by the embedding application each run.
pub struct Orchestrator<'a> {
    pub spec_generator: &'a dyn SpecGenerator,
    pub external_executor: &'a dyn ExternalExecutor,
    pub approval: &'a dyn Approval,
    pub budget: &'a dyn Budget,
    pub checkpoint_store: &'a dyn CheckpointStore,
    pub policy_engine: &'a PolicyEngine,
}

impl<'a> Orchestrator<'a> {
    #[instrument(skip_all, fields(operation_id, goal = %config.goal))]
    pub async fn run(
        &self,
        config: OrchestratorConfig,
        operation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorResult, AutoError> {
        let start = Instant::now();
        let mut result = OrchestratorResult::default();

        let resumed = self.checkpoint_store.load(operation_id).await.ok();

        if let Some(checkpoint) = &resumed {
            if checkpoint.status == StepStatus::Completed {
                info!(operation_id, "resume target already completed, returning prior result");
                return Ok(result_from_completed_checkpoint(checkpoint, start.elapsed()));
            }
        }

        let mut action_plan = resumed
            .as_ref()
            .and_then(|c| deserialize_metadata::<ActionPlan>(&c.metadata, "action_plan_json"))
            .unwrap_or_else(|| ActionPlan::create_default(&config.goal, &config.profile));
        action_plan.validate()?;

        let mut spec: Option<ProductSpec> = resumed.as_ref().and_then(|c| deserialize_metadata(&c.metadata, "spec_json"));
        let mut lock: Option<SpecLock> = spec.as_ref().map(SpecLock::generate);
        let mut plan: Option<Plan> = resumed.as_ref().and_then(|c| deserialize_metadata(&c.metadata, "plan_json"));

        if resumed.is_some() {
            info!(operation_id, "resuming from checkpoint");
        } else {
            let _ = self.save_snapshot(operation_id, StepStatus::Pending, &action_plan, spec.as_ref(), plan.as_ref(), HashMap::new()).await;
        }

        let status = self.budget.status().await?;
        check_preflight_budget(&action_plan, &status)?;

        let mut total_cost_so_far = 0.0;

        loop {
            if cancel.is_cancelled() {
                result.errors.push("cancelled".to_string());
                break;
            }

            let next = match action_plan.get_next_step() {
                Ok(step) => step.clone(),
                Err(AutoError::NoExecutableStep) => break,
                Err(e) => return Err(e),
            };

            let step_index = action_plan.steps.iter().position(|s| s.id == next.id).unwrap_or(0);
            let completed_steps = action_plan.steps.iter().filter(|s| s.status == StepStatus::Completed).count();
            let failed_steps = action_plan.steps.iter().filter(|s| s.status == StepStatus::Failed).count();
            let policy_ctx = PolicyContext {
                current_step: &next,
                plan: &action_plan,
                step_index,
                total_cost_so_far,
                execution_start_time: start,
                completed_steps,
                failed_steps,
            };
            let policy_result = self.policy_engine.evaluate(&policy_ctx).await;
            if !policy_result.allowed {
                let reason = policy_result.reason.unwrap_or_default();
                action_plan.update_step_status(&next.id, StepStatus::Failed)?;
                let extra = HashMap::from([("denied_step".to_string(), next.id.clone()), ("reason".to_string(), reason.clone())]);
                self.save_snapshot(operation_id, StepStatus::Failed, &action_plan, spec.as_ref(), plan.as_ref(), extra).await?;
                result.errors.push(reason);
                result.success = false;
                result.spec = spec;
                result.spec_lock = lock;
                result.plan = plan;
                result.action_plan = Some(action_plan);
                result.duration = start.elapsed();
                return Ok(result);
            }
            for warning in policy_result.warnings {
                warn!(operation_id, step = %next.id, warning, "policy warning");
            }

            if next.requires_approval {
                let placeholder_spec = spec.clone().unwrap_or_else(|| blank_spec(&config.goal));
                let approved = self.approval.prompt(&action_plan, &placeholder_spec).await?;
                if !approved {
                    action_plan.update_step_status(&next.id, StepStatus::Failed)?;
                    let extra = HashMap::from([("denied_step".to_string(), next.id.clone()), ("reason".to_string(), "approval denied".to_string())]);
                    self.save_snapshot(operation_id, StepStatus::Failed, &action_plan, spec.as_ref(), plan.as_ref(), extra).await?;
                    result.errors.push(format!("approval denied for step '{}'", next.id));
                    result.success = false;
                    result.action_plan = Some(action_plan);
                    result.duration = start.elapsed();
                    return Ok(result);
                }
            }

            action_plan.update_step_status(&next.id, StepStatus::InProgress)?;

            let step_outcome = match next.step_type {
                StepType::SpecUpdate => self.run_spec_update(&config).await.map(|s| {
                    spec = Some(s);
                }),
                StepType::SpecLock => match &spec {
                    Some(s) => {
                        lock = Some(SpecLock::generate(s));
                        Ok(())
                    }
                    None => Err(AutoError::InvalidActionPlan("spec:lock ran before spec:update".to_string())),
                },
                StepType::PlanGen => match (&spec, &lock) {
                    (Some(s), Some(l)) => self
                        .run_plan_gen(s, l, &config, cancel)
                        .await
                        .map(|p| {
                            plan = Some(p);
                        }),
                    _ => Err(AutoError::InvalidActionPlan("plan:gen ran before spec/lock were ready".to_string())),
                },
                StepType::BuildRun => match (&spec, &lock, &plan) {
                    (Some(s), Some(l), Some(p)) => {
                        write_artifacts(&config.output_dir, s, l, p, &action_plan).await?;
                        if config.dry_run {
                            action_plan.update_step_status(&next.id, StepStatus::Skipped)?;
                            result.success = true;
                            result.spec = spec.clone();
                            result.spec_lock = lock.clone();
                            result.plan = plan.clone();
                            result.action_plan = Some(action_plan.clone());
                            result.duration = start.elapsed();
                            self.save_snapshot(operation_id, StepStatus::Completed, &action_plan, spec.as_ref(), plan.as_ref(), HashMap::new()).await?;
                            return Ok(result);
                        }
                        self.run_build(p, operation_id, &config, &resumed, cancel, &mut result).await
                    }
                    _ => Err(AutoError::InvalidActionPlan("build:run ran before spec/lock/plan were ready".to_string())),
                },
            };

            match step_outcome {
                Ok(()) => {
                    action_plan.update_step_status(&next.id, StepStatus::Completed)?;
                    total_cost_so_far += crate::budget::step_cost_usd(next.step_type);
                    let _ = self.save_snapshot(operation_id, StepStatus::InProgress, &action_plan, spec.as_ref(), plan.as_ref(), HashMap::new()).await;
                }
                Err(e) => {
                    action_plan.update_step_status(&next.id, StepStatus::Failed)?;
                    result.errors.push(e.to_string());
                    result.success = false;
                    result.spec = spec;
                    result.spec_lock = lock;
                    result.plan = plan;
                    result.action_plan = Some(action_plan.clone());
                    result.duration = start.elapsed();
                    self.save_snapshot(operation_id, StepStatus::Failed, &action_plan, result.spec.as_ref(), result.plan.as_ref(), HashMap::new()).await?;
                    return Err(e);
                }
            }
        }

        result.success = !action_plan.has_failed_steps() && action_plan.is_complete();
        let terminal_status = if result.success { StepStatus::Completed } else { StepStatus::Failed };
        self.save_snapshot(operation_id, terminal_status, &action_plan, spec.as_ref(), plan.as_ref(), HashMap::new()).await?;
        result.spec = spec;
        result.spec_lock = lock;
        result.plan = plan;
        result.action_plan = Some(action_plan);
        result.duration = start.elapsed();
        Ok(result)
    }

    async fn run_spec_update(&self, config: &OrchestratorConfig) -> Result<ProductSpec, AutoError> {
        let request = SpecRequest { goal: config.goal.clone(), context: HashMap::new() };
        let spec = self.spec_generator.generate(&request).await?;
        spec.validate()?;
        Ok(spec)
    }

    async fn run_plan_gen(
        &self,
        spec: &ProductSpec,
        lock: &SpecLock,
        config: &OrchestratorConfig,
        cancel: &CancellationToken,
    ) -> Result<Plan, AutoError> {
        let plan = generate_plan(spec, lock, &GeneratorOptions::default(), cancel).await?;
        let scoped = scope::filter_plan(&plan, spec, &config.scope_patterns, config.include_dependencies);
        scoped.validate()?;
        Ok(scoped)
    }

    /// Executes `plan`, honoring a prior checkpoint by excluding tasks that
    /// already completed: the resumed plan contains only tasks not marked
    /// `Completed` in the loaded checkpoint, and the reported
    /// `tasks_executed` count adds back the tasks skipped for that reason.
    async fn run_build(
        &self,
        plan: &Plan,
        operation_id: &str,
        config: &OrchestratorConfig,
        resumed: &Option<CheckpointState>,
        cancel: &CancellationToken,
        result: &mut OrchestratorResult,
    ) -> Result<(), AutoError> {
        let (already_completed, remaining_plan) = partition_for_resume(plan, resumed);

        let executor = TaskExecutor::new(config.executor_config.clone());
        let progress: Option<ProgressCallback> = None;

        if remaining_plan.tasks.is_empty() {
            result.tasks_executed = already_completed.len();
            result.tasks_failed = 0;
            return Ok(());
        }

        match executor
            .run(&remaining_plan, operation_id, self.external_executor, self.checkpoint_store, self.budget, cancel, progress)
            .await
        {
            Ok(exec_result) => {
                result.tasks_executed = already_completed.len() + exec_result.success_tasks.len();
                result.tasks_failed = exec_result.failed_tasks.len();
                Ok(())
            }
            Err(AutoError::PartialExecution(failed)) => {
                result.tasks_executed = already_completed.len();
                result.tasks_failed = failed;
                warn!(operation_id, failed, "build:run finished with failed tasks");
                Err(AutoError::PartialExecution(failed))
            }
            Err(e) => Err(e),
        }
    }

    /// Writes (or merges into) the operation's checkpoint: the full
    /// ProductSpec/Plan/ActionPlan JSON plus goal/product go into `metadata`
    /// per the state layout the resume protocol reads back from, while any
    /// per-task statuses recorded by the task executor are preserved
    /// untouched. `extra_metadata` merges in last, for denial bookkeeping.
    async fn save_snapshot(
        &self,
        operation_id: &str,
        status: StepStatus,
        action_plan: &ActionPlan,
        spec: Option<&ProductSpec>,
        plan: Option<&Plan>,
        extra_metadata: HashMap<String, String>,
    ) -> Result<(), AutoError> {
        let existing = self.checkpoint_store.load(operation_id).await.ok();
        let mut metadata = existing.as_ref().map(|s| s.metadata.clone()).unwrap_or_default();
        let task_statuses = existing.map(|s| s.task_statuses).unwrap_or_default();

        metadata.insert("goal".to_string(), action_plan.goal.clone());
        if let Some(s) = spec {
            metadata.insert("product".to_string(), s.product.clone());
            metadata.insert("spec_json".to_string(), serde_json::to_string(s)?);
        }
        if let Some(p) = plan {
            metadata.insert("plan_json".to_string(), serde_json::to_string(p)?);
        }
        metadata.insert("action_plan_json".to_string(), serde_json::to_string(action_plan)?);
        metadata.extend(extra_metadata);

        self.checkpoint_store.save(&CheckpointState { operation_id: operation_id.to_string(), status, task_statuses, metadata }).await
    }
}

fn blank_spec(goal: &str) -> ProductSpec {
    ProductSpec {
        product: goal.to_string(),
        goals: vec![goal.to_string()],
        features: vec![],
        non_functional: Default::default(),
        acceptance: vec![],
        milestones: vec![],
    }
}

/// Reads a `serde_json`-encoded value back out of a checkpoint's metadata
/// map, per the resume protocol's "deserialize from metadata" step. Absent
/// key or malformed JSON both surface as `None`.
fn deserialize_metadata<T: DeserializeOwned>(metadata: &HashMap<String, String>, key: &str) -> Option<T> {
    serde_json::from_str(metadata.get(key)?).ok()
}

/// Resuming a completed operation is a no-op that returns the prior result
/// reconstructed from its checkpoint metadata.
fn result_from_completed_checkpoint(checkpoint: &CheckpointState, duration: Duration) -> OrchestratorResult {
    let spec: Option<ProductSpec> = deserialize_metadata(&checkpoint.metadata, "spec_json");
    let spec_lock = spec.as_ref().map(SpecLock::generate);
    let plan: Option<Plan> = deserialize_metadata(&checkpoint.metadata, "plan_json");
    let action_plan: Option<ActionPlan> = deserialize_metadata(&checkpoint.metadata, "action_plan_json");
    let tasks_executed = checkpoint.task_statuses.values().filter(|s| **s == StepStatus::Completed).count();
    let tasks_failed = checkpoint.task_statuses.values().filter(|s| **s == StepStatus::Failed).count();

    OrchestratorResult {
        success: true,
        spec,
        spec_lock,
        plan,
        action_plan,
        total_cost_usd: 0.0,
        duration,
        tasks_executed,
        tasks_failed,
        errors: Vec::new(),
    }
}

/// Split `plan` into the task ids already completed (per `resumed`) and a
/// new [`Plan`] retaining only the rest, in original order.
fn partition_for_resume(plan: &Plan, resumed: &Option<CheckpointState>) -> (Vec<TaskId>, Plan) {
    let Some(checkpoint) = resumed else {
        return (Vec::new(), plan.clone());
    };

    let mut completed = Vec::new();
    let mut pending_tasks = Vec::new();
    for task in &plan.tasks {
        match checkpoint.task_statuses.get(task.id.as_str()) {
            Some(StepStatus::Completed) => completed.push(task.id.clone()),
            _ => pending_tasks.push(task.clone()),
        }
    }
    (completed, Plan { tasks: pending_tasks })
}
