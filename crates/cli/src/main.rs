use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use confluo_engine::{ChainExecutor, EngineConfig, ProviderRegistry, RunScheduler, load_config, load_workflow_graph};
use confluo_github::GithubConfig;
use confluo_types::{Params, RunReport, RunStatus, WorkflowGraph};
use serde_json::Value;
use tokio::{signal, sync::mpsc};
use tracing::{debug, info, warn};

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Validate and run Confluo workflow chains.
#[derive(Parser, Debug)]
#[command(name = "confluo", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a workflow document and print its chain in execution order
    Validate {
        /// Path to a workflow document (.json, otherwise YAML)
        file: PathBuf,
    },
    /// List registered providers and their actions
    Providers,
    /// Poll the workflow's trigger and run its chain once it fires
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a workflow document (.json, otherwise YAML)
    file: PathBuf,

    /// Initial parameter; the value is parsed as JSON and falls back to a plain string
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Interval between trigger polls, e.g. 10s or 5m
    #[arg(long)]
    poll_interval: Option<String>,

    /// Upper bound on concurrently executing runs
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Print run lifecycle events to stderr as JSON lines
    #[arg(long)]
    events: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Validate { file } => {
            let graph = load_workflow_graph(&file)?;
            for line in chain_summary(&graph) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Providers => {
            let registry = build_registry()?;
            println!("{}", serde_json::to_string_pretty(&registry.describe())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let report = run_workflow(args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.status == RunStatus::Failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn init_tracing() {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_registry() -> Result<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    confluo_github::initialize(&registry, GithubConfig::from_env()).context("initialize github provider")?;
    Ok(registry)
}

async fn run_workflow(args: RunArgs) -> Result<RunReport> {
    let config = effective_config(load_config().context("load engine config")?, &args)?;
    let graph = Arc::new(load_workflow_graph(&args.file)?);
    let registry = build_registry()?;

    let executor = ChainExecutor::new(Arc::new(registry), config.executor_config()?);
    let scheduler = RunScheduler::new(executor, config.max_concurrent_runs);
    debug!(max_concurrent = scheduler.max_concurrent(), "scheduler ready");
    let params = initial_params(args.params, env::var(GITHUB_TOKEN_ENV).ok());

    let handle = if args.events {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        });
        scheduler.start_observed(graph, params, sender)
    } else {
        scheduler.start(graph, params)
    };

    let run_id = handle.run_id().to_string();
    info!(run_id = %run_id, workflow_id = %handle.workflow_id(), poll_interval = %config.poll_interval, "waiting for trigger");

    let join = handle.join();
    tokio::pin!(join);
    let report = tokio::select! {
        report = &mut join => report?,
        Ok(()) = signal::ctrl_c() => {
            warn!(run_id = %run_id, "interrupt received, canceling run");
            scheduler.cancel(&run_id);
            join.await?
        }
    };

    scheduler.shutdown().await;
    Ok(report)
}

/// Applies command-line overrides on top of the loaded configuration.
fn effective_config(mut config: EngineConfig, args: &RunArgs) -> Result<EngineConfig> {
    if let Some(interval) = &args.poll_interval {
        config.poll_interval = interval.clone();
    }
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_runs = max_concurrent;
    }
    config.validate().context("invalid run settings")?;
    Ok(config)
}

/// Builds the initial bag. An explicit `token` parameter wins over the environment.
fn initial_params(pairs: Vec<(String, Value)>, token: Option<String>) -> Params {
    let mut params: Params = pairs.into_iter().collect();
    if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
        params.entry("token").or_insert(Value::String(token));
    }
    params
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn chain_summary(graph: &WorkflowGraph) -> Vec<String> {
    let mut lines = vec![format!("{} ({} steps)", graph.name(), graph.chain_len())];
    for (position, node) in graph.chain().enumerate() {
        let binding = node
            .action
            .as_ref()
            .map(|binding| format!("{} / {}", binding.provider.name, binding.operation))
            .unwrap_or_default();
        lines.push(format!("{:>3}. {} [{}] {}", position + 1, node.id, node.kind, binding));
    }
    lines
}
