//! Concrete capability implementations wired into the CLI binary.
//!
//! `shipforge-core` only defines the traits; a real embedding application
//! supplies implementations like these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipforge_core::{AutoError, ExecutionResult, ExternalExecutor, Plan, ProductSpec, SpecGenerator, SpecRequest};
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

/// POSTs the spec-generation request to a configured router and retries
/// transient failures up to three times with linear backoff.
pub struct HttpSpecGenerator {
    client: reqwest::Client,
    router_url: String,
}

impl HttpSpecGenerator {
    pub fn new(router_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), router_url: router_url.into() }
    }
}

#[derive(Serialize)]
struct RouterRequest<'a> {
    goal: &'a str,
    context: &'a std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct RouterResponse {
    spec: ProductSpec,
}

#[async_trait]
impl SpecGenerator for HttpSpecGenerator {
    async fn generate(&self, request: &SpecRequest) -> Result<ProductSpec, AutoError> {
        let body = RouterRequest { goal: &request.goal, context: &request.context };
        let mut last_err = None;

        for attempt in 1..=3 {
            match self.client.post(&self.router_url).json(&body).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.json::<RouterResponse>().await {
                        Ok(parsed) => return Ok(parsed.spec),
                        Err(e) => last_err = Some(AutoError::infra("spec-router-decode", e)),
                    },
                    Err(e) => last_err = Some(AutoError::infra("spec-router-status", e)),
                },
                Err(e) => last_err = Some(AutoError::infra("spec-router-request", e)),
            }
            warn!(attempt, router_url = %self.router_url, "spec router call failed, retrying");
            tokio::time::sleep(Duration::from_millis(250 * attempt)).await;
        }

        Err(last_err.unwrap_or_else(|| AutoError::InvalidProductSpec("spec router exhausted retries".to_string())))
    }
}

/// Logs every task as successful without doing any real work — used for
/// `--dry-run`-adjacent demos where no real build backend is configured.
pub struct LoggingExecutor;

#[async_trait]
impl ExternalExecutor for LoggingExecutor {
    async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, AutoError> {
        let mut success_tasks = Vec::with_capacity(plan.tasks.len());
        for task in &plan.tasks {
            info!(task_id = %task.id, skill = %task.skill, "executing task (logging stand-in)");
            success_tasks.push(task.id.clone());
        }
        Ok(ExecutionResult { success_tasks, ..Default::default() })
    }
}

/// Prompts `y/n` on stdin/stdout for steps gated by approval.
pub struct StdioApproval;

#[async_trait]
impl shipforge_core::Approval for StdioApproval {
    async fn prompt(&self, plan: &shipforge_core::ActionPlan, _spec: &ProductSpec) -> Result<bool, AutoError> {
        print!("Approve plan for goal '{}'? [y/N] ", plan.goal);
        std::io::stdout().flush().map_err(|e| AutoError::infra("stdio-approval", e))?;

        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map_err(|e| AutoError::infra("stdio-approval", e))?;
        Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_executor_marks_every_task_successful() {
        use shipforge_core::ids::{FeatureId, Priority, TaskId};
        use shipforge_core::plan::Task;

        let plan = Plan {
            tasks: vec![Task {
                id: TaskId::new("task-001").unwrap(),
                feature_id: FeatureId::new("f1").unwrap(),
                expected_hash: "a".repeat(64),
                depends_on: vec![],
                skill: "go-backend".into(),
                priority: Priority::P0,
                model_hint: "codegen".into(),
                estimate: 1,
            }],
        };
        let result = LoggingExecutor.execute(&plan).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.success_tasks.len(), 1);
    }
}
