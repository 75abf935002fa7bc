//! The fixed four-step workflow: `spec:update -> spec:lock -> plan:gen -> build:run`.

use crate::error::AutoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const ACTION_PLAN_SCHEMA: &str = "specular.auto.plan/v1";

/// Closed set of step types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    #[serde(rename = "spec:update")]
    SpecUpdate,
    #[serde(rename = "spec:lock")]
    SpecLock,
    #[serde(rename = "plan:gen")]
    PlanGen,
    #[serde(rename = "build:run")]
    BuildRun,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::SpecUpdate => "spec:update",
            StepType::SpecLock => "spec:lock",
            StepType::PlanGen => "plan:gen",
            StepType::BuildRun => "build:run",
        }
    }
}

/// Terminal-or-not status of an [`ActionStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped)
    }

    pub fn is_done_for_dependents(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

/// A single step of the action plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub description: String,
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub signals: HashMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionStep {
    pub fn new(step_type: StepType, description: impl Into<String>, requires_approval: bool) -> Self {
        Self {
            id: String::new(),
            step_type,
            description: description.into(),
            requires_approval,
            reason: None,
            signals: HashMap::new(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Plan-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanMetadata {
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// The four-step workflow state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub schema: String,
    pub goal: String,
    pub steps: Vec<ActionStep>,
    pub metadata: ActionPlanMetadata,
}

impl ActionPlan {
    pub fn new(goal: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            schema: ACTION_PLAN_SCHEMA.to_string(),
            goal: goal.into(),
            steps: Vec::new(),
            metadata: ActionPlanMetadata {
                created_at: Utc::now(),
                version: "1".to_string(),
                profile: profile.into(),
                estimated_duration: None,
                estimated_cost: None,
            },
        }
    }

    /// The canonical four-step workflow, with steps 2 and 4 gated by approval.
    pub fn create_default(goal: impl Into<String>, profile: impl Into<String>) -> Self {
        let mut plan = ActionPlan::new(goal, profile);
        plan.add_step(ActionStep::new(StepType::SpecUpdate, "Derive structured specification from goal", false));
        plan.add_step(ActionStep::new(StepType::SpecLock, "Freeze specification with content hashes", true).depends_on(["step-1"]));
        plan.add_step(ActionStep::new(StepType::PlanGen, "Expand specification into task DAG", false).depends_on(["step-2"]));
        plan.add_step(ActionStep::new(StepType::BuildRun, "Execute task DAG", true).depends_on(["step-3"]));
        plan
    }

    pub fn add_step(&mut self, mut step: ActionStep) -> &str {
        if step.id.is_empty() {
            step.id = format!("step-{}", self.steps.len() + 1);
        }
        step.status = StepStatus::Pending;
        self.steps.push(step);
        self.steps.last().unwrap().id.as_str()
    }

    pub fn get_step(&self, id: &str) -> Result<&ActionStep, AutoError> {
        self.steps.iter().find(|s| s.id == id).ok_or_else(|| AutoError::StepNotFound(id.to_string()))
    }

    pub fn get_step_mut(&mut self, id: &str) -> Result<&mut ActionStep, AutoError> {
        self.steps.iter_mut().find(|s| s.id == id).ok_or_else(|| AutoError::StepNotFound(id.to_string()))
    }

    /// Mutate a step's status, set-once `started_at`/`completed_at`.
    pub fn update_step_status(&mut self, id: &str, status: StepStatus) -> Result<(), AutoError> {
        let step = self.get_step_mut(id)?;
        step.status = status;
        if status == StepStatus::InProgress && step.started_at.is_none() {
            step.started_at = Some(Utc::now());
        }
        if status.is_terminal() && step.completed_at.is_none() {
            step.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// First `pending` step whose dependencies are all done (completed or skipped).
    pub fn get_next_step(&self) -> Result<&ActionStep, AutoError> {
        let done: HashSet<&str> = self
            .steps
            .iter()
            .filter(|s| s.status.is_done_for_dependents())
            .map(|s| s.id.as_str())
            .collect();

        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Pending && s.dependencies.iter().all(|d| done.contains(d.as_str())))
            .ok_or(AutoError::NoExecutableStep)
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_done_for_dependents())
    }

    pub fn has_failed_steps(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Non-empty schema/goal, >=1 step, known step types, unique IDs,
    /// forward-only dependencies, cycle-freedom (DFS + recursion stack).
    pub fn validate(&self) -> Result<(), AutoError> {
        let mut reasons = Vec::new();

        if self.schema.is_empty() {
            reasons.push("schema must not be empty".to_string());
        }
        if self.goal.trim().is_empty() {
            reasons.push("goal must not be empty".to_string());
        }
        if self.steps.is_empty() {
            reasons.push("at least one step is required".to_string());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                reasons.push(format!("duplicate step id '{}'", step.id));
            }
        }

        // Forward-only: a dependency must already have been seen by the time
        // its dependent step is encountered, in insertion order.
        let mut seen_so_far: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            for dep in &step.dependencies {
                if !seen_so_far.contains(dep.as_str()) {
                    reasons.push(format!("step '{}' depends on unknown or later step '{}'", step.id, dep));
                }
            }
            seen_so_far.insert(step.id.as_str());
        }

        if let Err(cycle) = detect_cycle(&self.steps) {
            reasons.push(format!("circular dependency: {cycle}"));
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(AutoError::InvalidActionPlan(reasons.join("; ")))
        }
    }
}

fn detect_cycle(steps: &[ActionStep]) -> Result<(), String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    let index: HashMap<&str, usize> = steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();
    let mut marks = vec![Mark::Unvisited; steps.len()];
    let mut stack_path: Vec<&str> = Vec::new();

    fn visit<'a>(
        i: usize,
        steps: &'a [ActionStep],
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        stack_path: &mut Vec<&'a str>,
    ) -> Result<(), String> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InStack => {
                stack_path.push(&steps[i].id);
                return Err(stack_path.join(" -> "));
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InStack;
        stack_path.push(&steps[i].id);
        for dep in &steps[i].dependencies {
            if let Some(&j) = index.get(dep.as_str()) {
                visit(j, steps, index, marks, stack_path)?;
            }
        }
        stack_path.pop();
        marks[i] = Mark::Done;
        Ok(())
    }

    for i in 0..steps.len() {
        if marks[i] == Mark::Unvisited {
            visit(i, steps, &index, &mut marks, &mut stack_path)?;
        }
    }
    Ok(())
}
