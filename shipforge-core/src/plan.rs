//! The fine-grained task DAG ([`Task`], [`Plan`]) derived from a locked spec.

use crate::error::AutoError;
use crate::ids::{FeatureId, Priority, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One node of the task DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub feature_id: FeatureId,
    pub expected_hash: String,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    pub skill: String,
    pub priority: Priority,
    pub model_hint: String,
    pub estimate: u32,
}

impl Task {
    /// Structural (field-level) validation only — no graph checks.
    pub fn validate_fields(&self) -> Result<(), String> {
        if self.expected_hash.is_empty() {
            return Err(format!("task '{}' has an empty expected_hash", self.id));
        }
        if self.skill.is_empty() {
            return Err(format!("task '{}' has an empty skill", self.id));
        }
        if self.model_hint.is_empty() {
            return Err(format!("task '{}' has an empty model_hint", self.id));
        }
        if self.estimate == 0 {
            return Err(format!("task '{}' must have a positive estimate", self.id));
        }
        Ok(())
    }
}

/// The task DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<Task>,
}

/// Severity-split validation report, in the style of a strict graph linter:
/// errors fail validation, warnings are informational only.
#[derive(Debug, Clone, Default)]
pub struct PlanValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PlanValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Plan {
    /// Structural + graph validation. Fails with `InvalidPlan` on any error.
    pub fn validate(&self) -> Result<(), AutoError> {
        let report = self.lint();
        if report.is_valid() {
            Ok(())
        } else {
            Err(AutoError::InvalidPlan(report.errors.join("; ")))
        }
    }

    /// Produce the full error/warning split without raising.
    pub fn lint(&self) -> PlanValidationReport {
        let mut report = PlanValidationReport::default();

        if self.tasks.is_empty() {
            report.errors.push("at least one task required".to_string());
            return report;
        }

        for task in &self.tasks {
            if let Err(reason) = task.validate_fields() {
                report.errors.push(reason);
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                report.errors.push(format!("duplicate task id '{}'", task.id));
            }
        }

        let index: HashMap<&str, usize> = self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
        for (i, task) in self.tasks.iter().enumerate() {
            for dep in &task.depends_on {
                match index.get(dep.as_str()) {
                    None => report.errors.push(format!("task '{}' depends on unknown task '{}'", task.id, dep)),
                    Some(&j) if j >= i => {
                        report.errors.push(format!(
                            "task '{}' depends on '{}' which does not appear earlier in the plan",
                            task.id, dep
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Err(cycle) = detect_cycle(&self.tasks) {
            report.errors.push(format!("circular dependency: {cycle}"));
        }

        let has_dependent: HashSet<&str> = self.tasks.iter().flat_map(|t| t.depends_on.iter().map(|d| d.as_str())).collect();
        for task in &self.tasks {
            if !has_dependent.contains(task.id.as_str()) && self.tasks.len() > 1 {
                report.warnings.push(format!("task '{}' has no dependents", task.id));
            }
        }

        report
    }
}

fn detect_cycle(tasks: &[Task]) -> Result<(), String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    let index: HashMap<&str, usize> = tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];

    fn visit<'a>(
        i: usize,
        tasks: &'a [Task],
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        path: &mut Vec<&'a str>,
    ) -> Result<(), String> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InStack => {
                path.push(tasks[i].id.as_str());
                return Err(path.join(" -> "));
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InStack;
        path.push(tasks[i].id.as_str());
        for dep in &tasks[i].depends_on {
            if let Some(&j) = index.get(dep.as_str()) {
                visit(j, tasks, index, marks, path)?;
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        Ok(())
    }

    let mut path = Vec::new();
    for i in 0..tasks.len() {
        if marks[i] == Mark::Unvisited {
            visit(i, tasks, &index, &mut marks, &mut path)?;
        }
    }
    Ok(())
}
