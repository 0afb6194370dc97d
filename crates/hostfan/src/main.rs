//! hostfan daemon
//!
//! Runs one operation against every managed host on a bounded worker pool

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::{WrapErr, bail, eyre};
use hostfan_core::{Orchestrator, OrchestratorArgs};
use hostfan_exec::LocalExecutor;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod ops;

use config::{Config, LogFormat, TaskConfig};

#[derive(Parser)]
#[command(name = "hostfan")]
#[command(about = "Fan one operation out over every managed host", long_about = None)]
struct Cli {
    /// Configuration file (defaults to HOSTFAN_CONFIG or the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List managed hosts
    #[command(name = "hosts")]
    Hosts,
    /// Resolve every host address
    #[command(name = "resolve")]
    Resolve,
    /// Query cluster health
    #[command(name = "health")]
    Health,
    /// List configured tasks and registered operations
    #[command(name = "tasks")]
    Tasks,
    /// Run a configured task
    #[command(name = "task")]
    Task {
        /// Task name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default()?,
    };
    init_tracing(&config);

    let orchestrator = Orchestrator::new(OrchestratorArgs {
        pool: config.pool.clone(),
        executor: Arc::new(LocalExecutor::new()),
        hosts: config.host.clone(),
    })?;
    orchestrator.start()?;

    let outcome = run(&cli.command, &config, &orchestrator).await;
    orchestrator.shutdown().await;
    outcome
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.daemon.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(command: &Commands, config: &Config, orchestrator: &Arc<Orchestrator>) -> Result<()> {
    match command {
        Commands::Hosts => {
            for host in orchestrator.hosts() {
                println!("{}\t{}\t{}", host.name, host.address(), host.labels.join(","));
            }
        }
        Commands::Resolve => {
            for (host, ip) in ops::resolve_hosts(orchestrator).await? {
                println!("{}\t{}\t{}", host.name, host.address(), ip);
            }
        }
        Commands::Health => {
            let status = ops::cluster_health(orchestrator, &config.management).await?;
            println!("{status}");
            if !status.is_ok() {
                bail!("cluster is not healthy: {status}");
            }
        }
        Commands::Tasks => {
            let registry = ops::builtin_registry(&config.management);
            println!("operations:");
            for op in registry.operations() {
                let shape = if op.bound { "bound" } else { "free" };
                println!("  {}\t{} args\t{}", op.name, op.arity, shape);
            }
            println!("tasks:");
            for task in &config.task {
                println!("  {}\t{}", task.name, task.operation);
            }
        }
        Commands::Task { name } => {
            let task = config
                .task(name)
                .ok_or_else(|| eyre!("no task named {name}"))?;
            let output = run_task(task, config, orchestrator).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn run_task(
    task: &TaskConfig,
    config: &Config,
    orchestrator: &Arc<Orchestrator>,
) -> Result<Value> {
    let registry = ops::builtin_registry(&config.management);
    info!(task = %task.name, operation = %task.operation, "running task");

    if !task.settled {
        let results = registry
            .invoke(orchestrator, &task.operation, task.args.clone())
            .await?;
        return Ok(Value::Array(results));
    }

    let report = registry
        .invoke_settled(orchestrator, &task.operation, task.args.clone())
        .await?;
    let failed = report.failed();
    let outcomes: Vec<Value> = report
        .outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(value) => json!({ "ok": value }),
            Err(err) => json!({ "error": err.to_string() }),
        })
        .collect();
    info!(task = %task.name, failed, "task settled");

    Ok(json!({
        "operation": report.operation,
        "started_at": report.started_at.to_rfc3339(),
        "elapsed_ms": u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "outcomes": outcomes,
    }))
}
