//! Cost accounting: the per-step-type price table and pre-flight estimation.

use crate::action_plan::{ActionPlan, StepType};
use crate::error::AutoError;
use async_trait::async_trait;

/// Flat per-step-type cost in USD, used both for pre-flight estimation and
/// by the `CostLimit` policy checker.
pub fn step_cost_usd(step_type: StepType) -> f64 {
    match step_type {
        StepType::SpecUpdate => 0.50,
        StepType::SpecLock => 0.01,
        StepType::PlanGen => 0.30,
        StepType::BuildRun => 1.00,
    }
}

/// Snapshot of a budget's current standing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetStatus {
    pub limit_usd: f64,
    pub spent_usd: f64,
}

impl BudgetStatus {
    pub fn remaining_usd(&self) -> f64 {
        (self.limit_usd - self.spent_usd).max(0.0)
    }
}

/// External budget capability: queried for the current spend/limit and
/// charged as execution proceeds.
#[async_trait]
pub trait Budget: Send + Sync {
    async fn status(&self) -> Result<BudgetStatus, AutoError>;
    async fn charge(&self, amount_usd: f64) -> Result<(), AutoError>;
}

/// A [`Budget`] that never enforces a limit — always reports a status with
/// room to spare and accepts every charge.
pub struct NoopBudget;

#[async_trait]
impl Budget for NoopBudget {
    async fn status(&self) -> Result<BudgetStatus, AutoError> {
        Ok(BudgetStatus { limit_usd: f64::MAX, spent_usd: 0.0 })
    }

    async fn charge(&self, _amount_usd: f64) -> Result<(), AutoError> {
        Ok(())
    }
}

/// Sum of `step_cost_usd` across every step of `plan`.
pub fn estimate_plan_cost(plan: &ActionPlan) -> f64 {
    plan.steps.iter().map(|s| step_cost_usd(s.step_type)).sum()
}

/// Pre-flight check: does `status.remaining_usd()` cover the plan's estimated
/// cost? Returns a human-readable reason on shortfall, mirroring the shape of
/// the runtime `CostLimit` policy checker so callers can report pre-flight
/// and in-flight budget failures the same way.
pub fn check_preflight_budget(plan: &ActionPlan, status: &BudgetStatus) -> Result<(), AutoError> {
    let estimated = estimate_plan_cost(plan);
    if estimated > status.remaining_usd() {
        return Err(AutoError::InsufficientBudget(format!(
            "estimated cost ${estimated:.2} exceeds remaining budget ${:.2}",
            status.remaining_usd()
        )));
    }
    Ok(())
}
