//! Unified error type for the orchestration kernel.

use thiserror::Error;

/// Result alias used throughout `shipforge-core`.
pub type AutoResult<T> = Result<T, AutoError>;

/// Every error kind the kernel can surface, per the error-handling design.
#[derive(Debug, Error)]
pub enum AutoError {
    #[error("invalid feature id: {0}")]
    InvalidFeatureId(String),

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid product spec: {0}")]
    InvalidProductSpec(String),

    #[error("invalid action plan: {0}")]
    InvalidActionPlan(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("missing lock entry for feature: {0}")]
    MissingLockEntry(String),

    #[error("checkpoint missing: {0}")]
    CheckpointMissing(String),

    #[error("no executable step available")]
    NoExecutableStep,

    #[error("insufficient budget: {0}")]
    InsufficientBudget(String),

    #[error("policy denied: [{checker}] {reason}")]
    PolicyDenied { checker: String, reason: String },

    #[error("partial execution: {0} task(s) failed")]
    PartialExecution(usize),

    #[error("approval denied")]
    ApprovalDenied,

    #[error("operation cancelled")]
    Cancelled,

    #[error("{stage}: {source}")]
    Infrastructure {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AutoError {
    /// Wrap an arbitrary error as coming from a named external-capability stage.
    pub fn infra(stage: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AutoError::Infrastructure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    pub fn policy_denied(checker: impl Into<String>, reason: impl Into<String>) -> Self {
        AutoError::PolicyDenied {
            checker: checker.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AutoError {
    fn from(err: std::io::Error) -> Self {
        AutoError::infra("io", err)
    }
}

impl From<serde_json::Error> for AutoError {
    fn from(err: serde_json::Error) -> Self {
        AutoError::infra("json", err)
    }
}

impl From<serde_yaml::Error> for AutoError {
    fn from(err: serde_yaml::Error) -> Self {
        AutoError::infra("yaml", err)
    }
}
