//! Surge CLI tool

use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use surge_runtime::{BatchOutcome, ResourceIdentity, Scenario};
use tracing_subscriber::EnvFilter;

mod commands;
mod polling;

#[derive(Parser)]
#[command(name = "surge")]
#[command(author, version, about = "Bounded-concurrency batch runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch against a simulated slow backend
    Run {
        /// Number of tasks to launch
        #[arg(long, env = "SURGE_TASKS", default_value = "10", allow_negative_numbers = true)]
        tasks: i64,

        /// Admission gate permits (0 = unlimited)
        #[arg(long, env = "SURGE_PERMITS", default_value = "0", allow_negative_numbers = true)]
        permits: i64,

        /// Latency of each backend call in milliseconds
        #[arg(long, env = "SURGE_LATENCY_MS", default_value = "1500")]
        latency_ms: u64,

        /// Resource mapping: fixed:<id>, round-robin:<count>, or per-task
        #[arg(long, default_value = "fixed:1", value_parser = parse_identity)]
        identity: ResourceIdentity,

        /// Resource ids whose requests fail
        #[arg(long = "fail-resource")]
        fail_resources: Vec<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run the same workload without and with an admission gate
    Compare {
        /// Number of tasks to launch
        #[arg(long, env = "SURGE_TASKS", default_value = "10")]
        tasks: i64,

        /// Admission gate permits for the gated run
        #[arg(long, env = "SURGE_PERMITS", default_value = "3")]
        permits: i64,

        /// Latency of each backend call in milliseconds
        #[arg(long, env = "SURGE_LATENCY_MS", default_value = "500")]
        latency_ms: u64,

        /// Resource mapping: fixed:<id>, round-robin:<count>, or per-task
        #[arg(long, default_value = "round-robin:3", value_parser = parse_identity)]
        identity: ResourceIdentity,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a preset workload
    Scenario {
        /// Scenario name (same-resource or round-robin)
        scenario: Scenario,

        /// Admission gate permits (0 = unlimited)
        #[arg(long, default_value = "0")]
        permits: i64,

        /// Override the preset latency in milliseconds
        #[arg(long)]
        latency_ms: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Shared output options for batch commands
#[derive(clap::Args, Debug, Clone)]
struct OutputArgs {
    /// Poll and display progress snapshots instead of streaming events
    #[arg(long)]
    watch: bool,

    /// Poll interval in milliseconds when using --watch
    #[arg(long, default_value = "250")]
    poll_interval_ms: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "600")]
    timeout: u64,

    /// Print the final outcome as JSON
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the batch
    #[arg(long)]
    metrics: bool,
}

/// Parse a resource identity flag value
fn parse_identity(value: &str) -> Result<ResourceIdentity, String> {
    if value == "per-task" {
        return Ok(ResourceIdentity::Custom(Arc::new(|index| index as u64 + 1)));
    }

    let (kind, arg) = value
        .split_once(':')
        .ok_or_else(|| format!("invalid identity '{}': expected kind:value", value))?;
    let number: u64 = arg
        .parse()
        .map_err(|_| format!("invalid identity '{}': '{}' is not a number", value, arg))?;

    match kind {
        "fixed" => Ok(ResourceIdentity::Fixed(number)),
        "round-robin" if number > 0 => Ok(ResourceIdentity::RoundRobin { ids: number }),
        "round-robin" => Err("round-robin needs at least one resource id".to_string()),
        other => Err(format!(
            "unknown identity kind '{}' (expected fixed, round-robin, or per-task)",
            other
        )),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    // Batch events are printed directly; keep tracing quiet unless asked.
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Process exit code for a batch outcome
fn exit_code(outcome: &BatchOutcome) -> i32 {
    match outcome {
        BatchOutcome::Completed(summary) if summary.is_clean() => 0,
        BatchOutcome::Completed(_) | BatchOutcome::Canceled { .. } => 1,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Run {
            tasks,
            permits,
            latency_ms,
            identity,
            fail_resources,
            output,
        } => {
            let request = commands::run::RunRequest {
                tasks,
                permits,
                latency_ms,
                identity,
                fail_resources,
            };
            let outcome = commands::run::execute(request, &output.into()).await?;
            std::process::exit(exit_code(&outcome));
        }
        Commands::Compare {
            tasks,
            permits,
            latency_ms,
            identity,
            json,
        } => {
            commands::compare::execute(tasks, permits, latency_ms, identity, json).await?;
        }
        Commands::Scenario {
            scenario,
            permits,
            latency_ms,
            output,
        } => {
            let outcome =
                commands::scenario::execute(scenario, permits, latency_ms, &output.into()).await?;
            std::process::exit(exit_code(&outcome));
        }
    }

    Ok(())
}

impl From<OutputArgs> for commands::OutputOptions {
    fn from(args: OutputArgs) -> Self {
        Self {
            watch: args.watch,
            poll_interval: std::time::Duration::from_millis(args.poll_interval_ms.max(1)),
            timeout: std::time::Duration::from_secs(args.timeout),
            json: args.json,
            metrics: args.metrics,
        }
    }
}
