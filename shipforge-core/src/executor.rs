//! Drives an [`ExternalExecutor`] across retries, checkpointing progress and
//! reporting terminal outcomes.

use crate::action_plan::StepStatus;
use crate::budget::{step_cost_usd, Budget};
use crate::capabilities::{ExecutionResult, ExternalExecutor};
use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::error::AutoError;
use crate::plan::Plan;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Invoked exactly once, when execution reaches a terminal state (success or
/// exhausted retries) — never on intermediate per-attempt progress.
pub type ProgressCallback = Arc<dyn Fn(&ExecutionResult) + Send + Sync>;

#[derive(Clone)]
pub struct ExecutorConfig {
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_retries: 2, retry_backoff: Duration::from_secs(5) }
    }
}

pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Run `plan` to completion or exhaustion, checkpointing under
    /// `operation_id` after every attempt and charging `budget` once the run
    /// reaches a terminal state.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        plan: &Plan,
        operation_id: &str,
        external: &dyn ExternalExecutor,
        checkpoint_store: &dyn CheckpointStore,
        budget: &dyn Budget,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Result<ExecutionResult, AutoError> {
        let mut last_result = ExecutionResult::default();

        for attempt in 0..=self.config.max_retries {
            if cancel.is_cancelled() {
                return Err(AutoError::Cancelled);
            }

            let result = external.execute(plan).await?;
            self.checkpoint_attempt(operation_id, plan, &result, checkpoint_store).await?;
            last_result = result;

            if last_result.is_success() {
                budget.charge(self.settled_cost(plan)).await?;
                if let Some(cb) = &progress {
                    cb(&last_result);
                }
                info!(operation_id, attempt, "execution succeeded");
                return Ok(last_result);
            }

            warn!(
                operation_id,
                attempt,
                failed = last_result.failed_tasks.len(),
                "execution attempt failed"
            );

            if attempt == self.config.max_retries {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
                _ = cancel.cancelled() => return Err(AutoError::Cancelled),
            }
        }

        budget.charge(self.settled_cost(plan)).await?;
        let failed = last_result.failed_tasks.len();
        if let Some(cb) = &progress {
            cb(&last_result);
        }
        Err(AutoError::PartialExecution(failed))
    }

    fn settled_cost(&self, plan: &Plan) -> f64 {
        plan.tasks.len() as f64 * step_cost_usd(crate::action_plan::StepType::BuildRun)
    }

    async fn checkpoint_attempt(
        &self,
        operation_id: &str,
        plan: &Plan,
        result: &ExecutionResult,
        store: &dyn CheckpointStore,
    ) -> Result<(), AutoError> {
        let mut task_statuses = HashMap::new();
        for id in &result.success_tasks {
            task_statuses.insert(id.to_string(), StepStatus::Completed);
        }
        for id in &result.failed_tasks {
            task_statuses.insert(id.to_string(), StepStatus::Failed);
        }
        for id in &result.skipped_tasks {
            task_statuses.insert(id.to_string(), StepStatus::Skipped);
        }
        // Any task the external executor didn't report on is still pending.
        for task in &plan.tasks {
            task_statuses.entry(task.id.to_string()).or_insert(StepStatus::Pending);
        }

        // Preserve whatever metadata the orchestrator already recorded
        // (ProductSpec/Plan/ActionPlan JSON, goal/product) rather than
        // clobbering it with an empty map on every attempt.
        let metadata = store.load(operation_id).await.map(|s| s.metadata).unwrap_or_default();

        let status = if result.is_success() { StepStatus::Completed } else { StepStatus::InProgress };
        store
            .save(&CheckpointState {
                operation_id: operation_id.to_string(),
                status,
                task_statuses,
                metadata,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::NoopBudget;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::ids::{FeatureId, Priority, TaskId};
    use crate::plan::Task;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn task(id: &str) -> Task {
        Task {
            id: TaskId::new(id).unwrap(),
            feature_id: FeatureId::new("f1").unwrap(),
            expected_hash: "a".repeat(64),
            depends_on: vec![],
            skill: "go-backend".into(),
            priority: Priority::P0,
            model_hint: "codegen".into(),
            estimate: 1,
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl ExternalExecutor for AlwaysSucceeds {
        async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, AutoError> {
            Ok(ExecutionResult { success_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ExternalExecutor for AlwaysFails {
        async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, AutoError> {
            Ok(ExecutionResult { failed_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
        }
    }

    struct SucceedsOnAttempt {
        succeed_at: usize,
        seen: Mutex<usize>,
    }

    #[async_trait]
    impl ExternalExecutor for SucceedsOnAttempt {
        async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, AutoError> {
            let mut seen = self.seen.lock().unwrap();
            let attempt = *seen;
            *seen += 1;
            if attempt >= self.succeed_at {
                Ok(ExecutionResult { success_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
            } else {
                Ok(ExecutionResult { failed_tasks: plan.tasks.iter().map(|t| t.id.clone()).collect(), ..Default::default() })
            }
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig { max_retries: 2, retry_backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let result = executor
            .run(&plan, "op-1", &AlwaysSucceeds, &MemoryCheckpointStore::new(), &NoopBudget, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let external = SucceedsOnAttempt { succeed_at: 2, seen: Mutex::new(0) };
        let result = executor
            .run(&plan, "op-1", &external, &MemoryCheckpointStore::new(), &NoopBudget, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_partial_execution() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let err = executor
            .run(&plan, "op-1", &AlwaysFails, &MemoryCheckpointStore::new(), &NoopBudget, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AutoError::PartialExecution(1)));
    }

    #[tokio::test]
    async fn checkpoints_final_attempt() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let store = MemoryCheckpointStore::new();
        executor
            .run(&plan, "op-1", &AlwaysSucceeds, &store, &NoopBudget, &CancellationToken::new(), None)
            .await
            .unwrap();
        let state = store.load("op-1").await.unwrap();
        assert_eq!(state.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn progress_callback_fires_once_on_terminal_state() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cb: ProgressCallback = Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        executor
            .run(&plan, "op-1", &AlwaysSucceeds, &MemoryCheckpointStore::new(), &NoopBudget, &CancellationToken::new(), Some(cb))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_first_attempt() {
        let plan = Plan { tasks: vec![task("task-001")] };
        let executor = TaskExecutor::new(fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor
            .run(&plan, "op-1", &AlwaysSucceeds, &MemoryCheckpointStore::new(), &NoopBudget, &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AutoError::Cancelled));
    }
}
