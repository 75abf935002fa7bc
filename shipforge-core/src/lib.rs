//! Autonomous software-delivery orchestration kernel.
//!
//! A [`spec::ProductSpec`] is locked ([`lock::SpecLock`]) and expanded into
//! a task DAG ([`plan::Plan`]) by [`generator::generate_plan`]. An
//! [`action_plan::ActionPlan`] sequences the four high-level steps
//! (`spec:update`, `spec:lock`, `plan:gen`, `build:run`) that
//! [`orchestrator::Orchestrator`] drives end to end, gated by
//! [`policy::PolicyEngine`] and [`budget::Budget`], checkpointed via
//! [`checkpoint::CheckpointStore`] for resumable execution.

pub mod action_plan;
pub mod budget;
pub mod capabilities;
pub mod checkpoint;
pub mod error;
pub mod executor;
pub mod generator;
pub mod hash;
pub mod ids;
pub mod lock;
pub mod orchestrator;
pub mod persist;
pub mod plan;
pub mod policy;
pub mod scope;
pub mod spec;

pub use action_plan::{ActionPlan, ActionStep, StepStatus, StepType};
pub use budget::{Budget, BudgetStatus, NoopBudget};
pub use capabilities::{Approval, ExecutionResult, ExternalExecutor, SpecGenerator, SpecRequest};
pub use checkpoint::{CheckpointState, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use error::{AutoError, AutoResult};
pub use executor::{ExecutorConfig, TaskExecutor};
pub use generator::{generate_plan, GeneratorOptions};
pub use ids::{FeatureId, Priority, TaskId};
pub use lock::{LockEntry, SpecLock};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
pub use plan::{Plan, PlanValidationReport, Task};
pub use policy::{PolicyChecker, PolicyContext, PolicyEngine, PolicyResult};
pub use spec::{Api, Feature, Method, Milestone, NonFunctional, ProductSpec};
