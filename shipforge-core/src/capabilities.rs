//! External capability seams the kernel depends on but never implements
//! itself: spec generation, execution, and human approval are all supplied
//! by the embedding application.

use crate::action_plan::ActionPlan;
use crate::error::AutoError;
use crate::ids::TaskId;
use crate::plan::Plan;
use crate::spec::ProductSpec;
use async_trait::async_trait;
use std::collections::HashMap;

/// Natural-language request to derive or refine a [`ProductSpec`].
#[derive(Debug, Clone)]
pub struct SpecRequest {
    pub goal: String,
    pub context: HashMap<String, String>,
}

/// The external spec-generation capability. Implementations are expected to
/// retry transient failures internally; the kernel calls this once per
/// `spec:update` step.
#[async_trait]
pub trait SpecGenerator: Send + Sync {
    async fn generate(&self, request: &SpecRequest) -> Result<ProductSpec, AutoError>;
}

/// Outcome of running a subset (or all) of a [`Plan`]'s tasks.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success_tasks: Vec<TaskId>,
    pub failed_tasks: Vec<TaskId>,
    pub skipped_tasks: Vec<TaskId>,
    pub task_results: HashMap<TaskId, String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.failed_tasks.is_empty()
    }
}

/// The external task-execution capability — runs the build/test loop for a
/// task DAG. The kernel treats it as opaque: it hands over a [`Plan`] and
/// gets back per-task outcomes.
#[async_trait]
pub trait ExternalExecutor: Send + Sync {
    async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, AutoError>;
}

/// Human-in-the-loop gate for steps marked `requires_approval`.
#[async_trait]
pub trait Approval: Send + Sync {
    async fn prompt(&self, plan: &ActionPlan, spec: &ProductSpec) -> Result<bool, AutoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_result_is_success_with_no_failures() {
        let result = ExecutionResult { success_tasks: vec![TaskId::new("task-001").unwrap()], ..Default::default() };
        assert!(result.is_success());
    }

    #[test]
    fn execution_result_is_not_success_with_failures() {
        let result = ExecutionResult { failed_tasks: vec![TaskId::new("task-001").unwrap()], ..Default::default() };
        assert!(!result.is_success());
    }
}
