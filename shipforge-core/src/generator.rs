//! Feature -> Task expansion: turns a locked [`ProductSpec`] into a [`Plan`].

use crate::error::AutoError;
use crate::ids::{Priority, TaskId};
use crate::lock::SpecLock;
use crate::plan::{Plan, Task};
use crate::spec::ProductSpec;
use tokio_util::sync::CancellationToken;

/// Generator knobs. `enable_estimates = false` pins every task's estimate to 1.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub enable_estimates: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self { enable_estimates: true }
    }
}

/// Expand every feature of `spec` (in declared order) into one [`Task`], wiring
/// priority-derived dependencies, then validate the resulting [`Plan`].
pub async fn generate_plan(
    spec: &ProductSpec,
    lock: &SpecLock,
    options: &GeneratorOptions,
    cancel: &CancellationToken,
) -> Result<Plan, AutoError> {
    let mut tasks: Vec<Task> = Vec::with_capacity(spec.features.len());

    for (i, feature) in spec.features.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AutoError::Cancelled);
        }

        let entry = lock.entry(&feature.id)?;

        let depends_on: Vec<TaskId> = match feature.priority {
            Priority::P0 => Vec::new(),
            Priority::P1 => p0_tasks_before(&tasks, &spec.features, i),
            Priority::P2 => {
                let mut deps = p0_tasks_before(&tasks, &spec.features, i);
                deps.extend(p1_tasks_before(&tasks, &spec.features, i));
                deps
            }
        };

        let skill = infer_skill(feature);
        let model_hint = infer_model_hint(feature);
        let estimate = if options.enable_estimates { estimate_task(feature) } else { 1 };

        tasks.push(Task {
            id: TaskId::new(format!("task-{:03}", i + 1))?,
            feature_id: feature.id.clone(),
            expected_hash: entry.hash.clone(),
            depends_on,
            skill,
            priority: feature.priority,
            model_hint,
            estimate,
        });
    }

    let plan = Plan { tasks };
    plan.validate()?;
    Ok(plan)
}

fn p0_tasks_before(tasks: &[Task], features: &[crate::spec::Feature], i: usize) -> Vec<TaskId> {
    (0..i)
        .filter(|&j| features[j].priority == Priority::P0)
        .map(|j| tasks[j].id.clone())
        .collect()
}

fn p1_tasks_before(tasks: &[Task], features: &[crate::spec::Feature], i: usize) -> Vec<TaskId> {
    (0..i)
        .filter(|&j| features[j].priority == Priority::P1)
        .map(|j| tasks[j].id.clone())
        .collect()
}

fn infer_skill(feature: &crate::spec::Feature) -> String {
    if feature.api.iter().any(|api| api.path.contains("/api")) {
        return "go-backend".to_string();
    }
    let text = format!("{} {}", feature.title, feature.desc).to_lowercase();
    if ["ui", "interface", "component"].iter().any(|w| text.contains(w)) {
        return "ui-react".to_string();
    }
    if ["docker", "deploy", "infrastructure"].iter().any(|w| text.contains(w)) {
        return "infra".to_string();
    }
    if ["database", "schema", "migration"].iter().any(|w| text.contains(w)) {
        return "database".to_string();
    }
    if ["test", "validation"].iter().any(|w| text.contains(w)) {
        return "testing".to_string();
    }
    "go-backend".to_string()
}

fn infer_model_hint(feature: &crate::spec::Feature) -> String {
    if feature.api.len() > 5 {
        "long-context".to_string()
    } else if feature.success.len() > 5 {
        "agentic".to_string()
    } else {
        "codegen".to_string()
    }
}

fn estimate_task(feature: &crate::spec::Feature) -> u32 {
    let raw = 1 + feature.api.len() + feature.success.len() / 2 + feature.trace.len();
    raw.clamp(1, 10) as u32
}
