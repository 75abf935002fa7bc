//! Gating checks run before each action-plan step is allowed to execute.
//!
//! Mirrors the retry/circuit-breaker shape of a fault-tolerant executor, but
//! for admission decisions rather than execution outcomes: every checker
//! gets a read-only view of the plan's progress and either allows, denies
//! with a reason, or allows with warnings.

use crate::action_plan::{ActionPlan, ActionStep, StepType};
use crate::budget::step_cost_usd;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Read-only snapshot handed to every [`PolicyChecker`].
pub struct PolicyContext<'a> {
    pub current_step: &'a ActionStep,
    pub plan: &'a ActionPlan,
    pub step_index: usize,
    pub total_cost_so_far: f64,
    pub execution_start_time: Instant,
    pub completed_steps: usize,
    pub failed_steps: usize,
}

impl<'a> PolicyContext<'a> {
    /// `len(plan.steps) − completedSteps − failedSteps − 1`, the `−1`
    /// accounting for the step currently being evaluated.
    pub fn remaining_steps(&self) -> usize {
        self.plan.steps.len().saturating_sub(self.completed_steps + self.failed_steps + 1)
    }

    pub fn elapsed(&self) -> Duration {
        self.execution_start_time.elapsed()
    }
}

/// Outcome of a single checker (or the composite engine).
#[derive(Debug, Clone, Default)]
pub struct PolicyResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl PolicyResult {
    pub fn allow() -> Self {
        Self { allowed: true, ..Default::default() }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()), ..Default::default() }
    }
}

#[async_trait]
pub trait PolicyChecker: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult;
}

/// `CostLimit(maxTotal, maxPerStep)`: denies when this step's own estimate
/// exceeds `max_per_step_usd`, or when the running total plus this step's
/// estimate would exceed `max_total_usd`. Warns once projected remaining
/// budget drops below 20% of `max_total_usd`.
pub struct CostLimitChecker {
    pub max_total_usd: f64,
    pub max_per_step_usd: f64,
}

#[async_trait]
impl PolicyChecker for CostLimitChecker {
    fn name(&self) -> &str {
        "cost-limit"
    }

    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let estimate = step_cost_usd(ctx.current_step.step_type);
        if estimate > self.max_per_step_usd {
            return PolicyResult::deny(format!("step estimate ${estimate:.2} exceeds per-step limit ${:.2}", self.max_per_step_usd));
        }

        let projected = ctx.total_cost_so_far + estimate;
        if projected > self.max_total_usd {
            return PolicyResult::deny(format!("projected cost ${projected:.2} exceeds limit ${:.2}", self.max_total_usd));
        }

        let mut result = PolicyResult::allow();
        if projected > self.max_total_usd * 0.8 {
            result.warnings.push(format!("projected cost ${projected:.2} is within 20% of limit ${:.2}", self.max_total_usd));
        }
        result
    }
}

/// `Timeout(maxDuration, maxStepDuration)`: denies once wall-clock elapsed
/// exceeds `max_duration`, or once the remaining budget before `max_duration`
/// leaves less than `max_step_duration` for the current step. Warns when
/// less than 20% of `max_duration`'s budget remains.
pub struct TimeoutChecker {
    pub max_duration: Duration,
    pub max_step_duration: Duration,
}

#[async_trait]
impl PolicyChecker for TimeoutChecker {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let elapsed = ctx.elapsed();
        if elapsed > self.max_duration {
            return PolicyResult::deny(format!("elapsed {elapsed:?} exceeds max duration {:?}", self.max_duration));
        }

        let remaining = self.max_duration - elapsed;
        if remaining < self.max_step_duration {
            return PolicyResult::deny(format!("remaining budget {remaining:?} leaves less than the per-step duration {:?}", self.max_step_duration));
        }

        let mut result = PolicyResult::allow();
        if remaining < self.max_duration.mul_f64(0.2) {
            result.warnings.push(format!("remaining budget {remaining:?} is within 20% of max duration {:?}", self.max_duration));
        }
        result
    }
}

/// `StepType(allowed, blocked)`: the blacklist takes precedence over the
/// whitelist; an empty whitelist means "all allowed except blacklisted".
pub struct StepTypeChecker {
    pub allowed_types: Vec<StepType>,
    pub blocked_types: Vec<StepType>,
}

#[async_trait]
impl PolicyChecker for StepTypeChecker {
    fn name(&self) -> &str {
        "step-type"
    }

    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let step_type = ctx.current_step.step_type;
        if self.blocked_types.contains(&step_type) {
            return PolicyResult::deny(format!("step type '{}' is blocked", step_type.as_str()));
        }
        if self.allowed_types.is_empty() || self.allowed_types.contains(&step_type) {
            PolicyResult::allow()
        } else {
            PolicyResult::deny(format!("step type '{}' is not permitted", step_type.as_str()))
        }
    }
}

/// `MaxSteps(n)`: denies when `completedSteps + 1 > n`; warns within 2 steps
/// of the limit.
pub struct MaxStepsChecker {
    pub max_steps: usize,
}

#[async_trait]
impl PolicyChecker for MaxStepsChecker {
    fn name(&self) -> &str {
        "max-steps"
    }

    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let about_to_run = ctx.completed_steps + 1;
        if about_to_run > self.max_steps {
            return PolicyResult::deny(format!("maximum step count exceeded: {about_to_run} > {} limit", self.max_steps));
        }
        let mut result = PolicyResult::allow();
        if self.max_steps - about_to_run < 2 {
            result.warnings.push(format!("{about_to_run} of {} steps used, approaching the limit", self.max_steps));
        }
        result
    }
}

/// Tracks per-step retry counts and denies once a step has been retried
/// `max_retries` times. Stateful — holds a mutable counter across calls.
pub struct MaxRetriesChecker {
    pub max_retries: u32,
    counts: parking_lot_free::Mutex<HashMap<String, u32>>,
}

impl MaxRetriesChecker {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, counts: parking_lot_free::Mutex::new(HashMap::new()) }
    }

    pub fn record_retry(&self, step_id: &str) {
        let mut counts = self.counts.lock();
        *counts.entry(step_id.to_string()).or_insert(0) += 1;
    }

    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

#[async_trait]
impl PolicyChecker for MaxRetriesChecker {
    fn name(&self) -> &str {
        "max-retries"
    }

    async fn check(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let retries = *self.counts.lock().get(ctx.current_step.id.as_str()).unwrap_or(&0);
        if retries >= self.max_retries {
            return PolicyResult::deny(format!("step '{}' has been retried {retries} times, at the limit of {}", ctx.current_step.id, self.max_retries));
        }
        PolicyResult::allow()
    }
}

/// Runs every registered checker, first-denial-wins, warnings and metadata
/// accumulating across all checkers regardless of outcome.
#[derive(Default)]
pub struct PolicyEngine {
    checkers: Vec<Box<dyn PolicyChecker>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, checker: Box<dyn PolicyChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    pub async fn evaluate(&self, ctx: &PolicyContext<'_>) -> PolicyResult {
        let mut warnings = Vec::new();
        let mut metadata = HashMap::new();

        for checker in &self.checkers {
            let result = checker.check(ctx).await;
            warnings.extend(result.warnings);
            metadata.extend(result.metadata);
            if !result.allowed {
                return PolicyResult {
                    allowed: false,
                    reason: Some(format!("[{}] {}", checker.name(), result.reason.unwrap_or_default())),
                    warnings,
                    metadata,
                };
            }
        }

        PolicyResult { allowed: true, reason: None, warnings, metadata }
    }
}

/// A minimal, dependency-free mutex shim so this module doesn't need to pull
/// in `parking_lot` just for one stateful checker's interior mutability.
mod parking_lot_free {
    use std::sync::Mutex as StdMutex;

    pub struct Mutex<T>(StdMutex<T>);

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self(StdMutex::new(value))
        }

        pub fn lock(&self) -> std::sync::MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_plan::StepStatus;

    fn ctx_for<'a>(plan: &'a ActionPlan, step: &'a ActionStep, start: Instant) -> PolicyContext<'a> {
        PolicyContext { current_step: step, plan, step_index: 0, total_cost_so_far: 0.0, execution_start_time: start, completed_steps: 0, failed_steps: 0 }
    }

    #[tokio::test]
    async fn cost_limit_denies_over_total_budget() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = CostLimitChecker { max_total_usd: 0.10, max_per_step_usd: 100.0 };
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        let result = checker.check(&ctx).await;
        assert!(!result.allowed);
    }

    #[tokio::test]
    async fn cost_limit_denies_over_per_step_budget() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = CostLimitChecker { max_total_usd: 100.0, max_per_step_usd: 0.10 };
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        let result = checker.check(&ctx).await;
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("per-step limit"));
    }

    #[tokio::test]
    async fn cost_limit_warns_near_threshold() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = CostLimitChecker { max_total_usd: 1.0, max_per_step_usd: 100.0 };
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        let result = checker.check(&ctx).await;
        assert!(result.allowed);
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn timeout_denies_when_elapsed_exceeds_max() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = TimeoutChecker { max_duration: Duration::from_secs(0), max_step_duration: Duration::from_secs(0) };
        let ctx = ctx_for(&plan, &plan.steps[0], Instant::now() - Duration::from_millis(10));
        let result = checker.check(&ctx).await;
        assert!(!result.allowed);
    }

    #[tokio::test]
    async fn timeout_denies_when_remaining_budget_below_step_duration() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = TimeoutChecker { max_duration: Duration::from_secs(10), max_step_duration: Duration::from_secs(5) };
        let ctx = ctx_for(&plan, &plan.steps[0], Instant::now() - Duration::from_secs(8));
        let result = checker.check(&ctx).await;
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("per-step duration"));
    }

    #[tokio::test]
    async fn timeout_warns_within_20_percent_of_budget() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = TimeoutChecker { max_duration: Duration::from_secs(10), max_step_duration: Duration::from_millis(1) };
        let ctx = ctx_for(&plan, &plan.steps[0], Instant::now() - Duration::from_secs(9));
        let result = checker.check(&ctx).await;
        assert!(result.allowed);
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn step_type_checker_denies_unlisted_type() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = StepTypeChecker { allowed_types: vec![StepType::SpecUpdate], blocked_types: vec![] };
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        assert!(!checker.check(&ctx).await.allowed);
    }

    #[tokio::test]
    async fn step_type_checker_empty_whitelist_allows_all_except_blocked() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = StepTypeChecker { allowed_types: vec![], blocked_types: vec![StepType::BuildRun] };
        let allowed_ctx = ctx_for(&plan, &plan.steps[0], Instant::now());
        assert!(checker.check(&allowed_ctx).await.allowed);
        let blocked_ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        assert!(!checker.check(&blocked_ctx).await.allowed);
    }

    #[tokio::test]
    async fn step_type_checker_blacklist_wins_over_whitelist() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = StepTypeChecker { allowed_types: vec![StepType::BuildRun], blocked_types: vec![StepType::BuildRun] };
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        assert!(!checker.check(&ctx).await.allowed);
    }

    #[tokio::test]
    async fn max_steps_denies_using_completed_steps_not_plan_length() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = MaxStepsChecker { max_steps: 3 };
        let mut ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        ctx.completed_steps = 3;
        let result = checker.check(&ctx).await;
        assert!(!result.allowed);
        assert_eq!(result.reason.unwrap(), "maximum step count exceeded: 4 > 3 limit");
    }

    #[tokio::test]
    async fn max_steps_allows_under_limit_and_warns_near_it() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = MaxStepsChecker { max_steps: 4 };
        let mut ctx = ctx_for(&plan, &plan.steps[2], Instant::now());
        ctx.completed_steps = 2;
        let result = checker.check(&ctx).await;
        assert!(result.allowed);
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn max_retries_checker_tracks_and_denies() {
        let plan = ActionPlan::create_default("g", "p");
        let checker = MaxRetriesChecker::new(2);
        let step = &plan.steps[0];
        checker.record_retry(&step.id);
        checker.record_retry(&step.id);
        let ctx = ctx_for(&plan, step, Instant::now());
        assert!(!checker.check(&ctx).await.allowed);
        checker.reset();
        let ctx = ctx_for(&plan, step, Instant::now());
        assert!(checker.check(&ctx).await.allowed);
    }

    #[tokio::test]
    async fn engine_first_denial_wins_with_checker_name_prefix() {
        let plan = ActionPlan::create_default("g", "p");
        let mut step = plan.steps[3].clone();
        step.status = StepStatus::Pending;
        let engine = PolicyEngine::new()
            .register(Box::new(StepTypeChecker { allowed_types: vec![StepType::SpecUpdate], blocked_types: vec![] }))
            .register(Box::new(CostLimitChecker { max_total_usd: 100.0, max_per_step_usd: 100.0 }));
        let ctx = ctx_for(&plan, &step, Instant::now());
        let result = engine.evaluate(&ctx).await;
        assert!(!result.allowed);
        assert_eq!(result.reason.unwrap(), "[step-type] step type 'build:run' is not permitted");
    }

    #[tokio::test]
    async fn engine_accumulates_warnings_across_checkers() {
        let plan = ActionPlan::create_default("g", "p");
        let engine = PolicyEngine::new().register(Box::new(CostLimitChecker { max_total_usd: 1.0, max_per_step_usd: 100.0 }));
        let ctx = ctx_for(&plan, &plan.steps[3], Instant::now());
        let result = engine.evaluate(&ctx).await;
        assert!(result.allowed);
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn remaining_steps_accounts_for_completed_and_failed() {
        let plan = ActionPlan::create_default("g", "p");
        let mut ctx = ctx_for(&plan, &plan.steps[2], Instant::now());
        ctx.completed_steps = 1;
        ctx.failed_steps = 1;
        assert_eq!(ctx.remaining_steps(), 1);
    }
}
