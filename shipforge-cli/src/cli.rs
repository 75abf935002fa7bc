//! Command-line surface for the orchestrator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shipforge - drive an autonomous delivery run from a goal to shipped code
#[derive(Parser)]
#[command(name = "shipforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an orchestration from a goal to completion
    Run {
        /// What to build, in natural language
        goal: String,

        /// Delivery profile (selects policy defaults)
        #[arg(long, default_value = "default")]
        profile: String,

        /// Plan and persist artifacts without executing any tasks
        #[arg(long)]
        dry_run: bool,

        /// Directory to write spec.yaml / spec.lock.json / plan.json / action-plan.json
        #[arg(short, long, default_value = ".shipforge")]
        output: PathBuf,

        /// Restrict execution to features/paths matching these patterns
        #[arg(long = "scope")]
        scope_patterns: Vec<String>,

        /// Pull in transitive dependencies of scoped features
        #[arg(long)]
        include_dependencies: bool,

        /// Hard USD ceiling for this run
        #[arg(long, default_value_t = 10.0)]
        cost_limit: f64,

        /// Router URL for the external spec-generation capability
        #[arg(long, env = "SHIPFORGE_ROUTER_URL")]
        router_url: Option<String>,
    },

    /// Resume a previously checkpointed operation
    Resume {
        /// Operation id to resume
        operation_id: String,

        /// Directory to write spec.yaml / spec.lock.json / plan.json / action-plan.json
        #[arg(short, long, default_value = ".shipforge")]
        output: PathBuf,

        /// Directory where checkpoints are stored
        #[arg(long, default_value = ".shipforge/checkpoints")]
        checkpoint_dir: PathBuf,
    },

    /// Show what a scope filter would include, without running anything
    EstimateScope {
        /// Plan file to estimate against (plan.json)
        plan: PathBuf,

        /// Spec file the plan was generated from (spec.yaml)
        spec: PathBuf,

        /// Patterns to evaluate
        #[arg(long = "scope")]
        scope_patterns: Vec<String>,

        /// Pull in transitive dependencies of scoped features
        #[arg(long)]
        include_dependencies: bool,
    },
}
