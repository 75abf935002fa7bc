//! shipforge - command-line driver for the autonomous delivery orchestrator.

mod capabilities;
mod cli;
mod config;

use capabilities::{HttpSpecGenerator, LoggingExecutor, StdioApproval};
use clap::Parser;
use cli::{Cli, Commands};
use config::FileConfig;
use shipforge_core::policy::CostLimitChecker;
use shipforge_core::{scope, CheckpointStore, ExecutorConfig, FileCheckpointStore, NoopBudget, Orchestrator, OrchestratorConfig, PolicyEngine};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::error;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file_config = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { goal, profile, dry_run, output, scope_patterns, include_dependencies, cost_limit, router_url } => {
            run_orchestration(goal, profile, dry_run, output, scope_patterns, include_dependencies, cost_limit, router_url, &file_config, None).await
        }
        Commands::Resume { operation_id, output, checkpoint_dir } => {
            resume_orchestration(operation_id, output, checkpoint_dir, &file_config).await
        }
        Commands::EstimateScope { plan, spec, scope_patterns, include_dependencies } => {
            estimate_scope(&plan, &spec, &scope_patterns, include_dependencies)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_orchestration(
    goal: String,
    profile: String,
    dry_run: bool,
    output: std::path::PathBuf,
    scope_patterns: Vec<String>,
    include_dependencies: bool,
    cost_limit: f64,
    router_url: Option<String>,
    file_config: &FileConfig,
    operation_id: Option<String>,
) -> anyhow::Result<()> {
    let router_url = router_url.or_else(|| file_config.router_url.clone());
    let Some(router_url) = router_url else {
        anyhow::bail!("a router URL is required: pass --router-url or set it in the config file");
    };

    let spec_generator = HttpSpecGenerator::new(router_url);
    let executor = LoggingExecutor;
    let approval = StdioApproval;
    let budget = NoopBudget;
    let checkpoint_dir = file_config.checkpoint_dir.clone().unwrap_or_else(|| output.join("checkpoints"));
    let checkpoint_store = FileCheckpointStore::new(checkpoint_dir);
    let policy_engine = PolicyEngine::new().register(Box::new(CostLimitChecker { max_total_usd: cost_limit, max_per_step_usd: cost_limit }));

    let orchestrator = Orchestrator {
        spec_generator: &spec_generator,
        external_executor: &executor,
        approval: &approval,
        budget: &budget,
        checkpoint_store: &checkpoint_store,
        policy_engine: &policy_engine,
    };

    let config = OrchestratorConfig {
        goal,
        profile,
        dry_run,
        output_dir: output,
        scope_patterns,
        include_dependencies,
        executor_config: ExecutorConfig { max_retries: file_config.max_retries.unwrap_or(2), ..Default::default() },
        cost_limit_usd: file_config.cost_limit.unwrap_or(cost_limit),
    };

    let operation_id = operation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let cancel = CancellationToken::new();

    let result = orchestrator.run(config, &operation_id, &cancel).await;

    match result {
        Ok(result) => {
            println!("operation {operation_id}: success={} executed={} failed={}", result.success, result.tasks_executed, result.tasks_failed);
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(operation_id, error = %e, "orchestration failed");
            Err(e.into())
        }
    }
}

async fn resume_orchestration(
    operation_id: String,
    output: std::path::PathBuf,
    checkpoint_dir: std::path::PathBuf,
    file_config: &FileConfig,
) -> anyhow::Result<()> {
    let checkpoint_store = FileCheckpointStore::new(checkpoint_dir.clone());
    let checkpoint = checkpoint_store.load(&operation_id).await?;
    println!("resuming operation {operation_id} from status {:?}", checkpoint.status);

    let router_url = file_config.router_url.clone();
    run_orchestration(
        format!("resume:{operation_id}"),
        "default".to_string(),
        false,
        output,
        Vec::new(),
        false,
        file_config.cost_limit.unwrap_or(10.0),
        router_url,
        file_config,
        Some(operation_id),
    )
    .await
}

fn estimate_scope(plan_path: &Path, spec_path: &Path, patterns: &[String], include_dependencies: bool) -> anyhow::Result<()> {
    let plan_bytes = std::fs::read(plan_path)?;
    let plan: shipforge_core::Plan = serde_json::from_slice(&plan_bytes)?;

    let spec_text = std::fs::read_to_string(spec_path)?;
    let spec: shipforge_core::ProductSpec = serde_yaml::from_str(&spec_text)?;

    let (matched, total) = scope::estimate_impact(&plan, &spec, patterns, include_dependencies);
    println!("{matched}/{total} tasks match the given scope");
    Ok(())
}
