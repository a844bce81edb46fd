//! CLI command definitions for sim-dispatch.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use crate::api::{self, AppState, DispatchReply, DispatchRequest};
use crate::compute::{MockSimulation, MockSimulationConfig};
use crate::dispatch::{DispatchConfig, DispatchController};
use crate::metrics::DispatchMetrics;

/// Default bind address of the HTTP server.
const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Bounded-concurrency simulation dispatcher.
#[derive(Parser, Debug)]
#[command(name = "sim-dispatch")]
#[command(about = "Dispatch batches of simulation tasks with bounded concurrency")]
#[command(version)]
#[command(
    long_about = "sim-dispatch executes batches of independent simulation tasks with a concurrency cap, per-task timeouts and retries.\n\nExample usage:\n  sim-dispatch serve --bind 0.0.0.0:3000\n  sim-dispatch run --input request.json --output response.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Serve the simulation endpoint over HTTP.
    Serve(ServeArgs),

    /// Dispatch one request file and print the response.
    Run(RunArgs),
}

/// Arguments for `sim-dispatch serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(short, long, default_value = DEFAULT_BIND, env = "SIM_DISPATCH_BIND")]
    pub bind: String,

    /// Disable the Prometheus `/metrics` endpoint.
    #[arg(long)]
    pub no_metrics: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Arguments for `sim-dispatch run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a JSON request (`{"simulations": [...]}` or `{"character": {...}}`).
    #[arg(short, long)]
    pub input: String,

    /// Write the JSON response here instead of stdout.
    #[arg(short, long)]
    pub output: Option<String>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Engine settings shared by all commands.
#[derive(Parser, Debug, Clone)]
pub struct EngineArgs {
    /// YAML configuration file. Falls back to `DISPATCH_*` environment variables.
    #[arg(short, long, env = "DISPATCH_CONFIG")]
    pub config: Option<String>,

    /// Override the concurrency cap from the configuration.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Probability (0.0-1.0) that a mock simulation attempt fails.
    #[arg(long, default_value = "0.0")]
    pub mock_failure_rate: f64,

    /// Lower bound of the mock simulation latency in milliseconds.
    #[arg(long, default_value = "500")]
    pub mock_min_latency_ms: u64,

    /// Upper bound of the mock simulation latency in milliseconds.
    #[arg(long, default_value = "2000")]
    pub mock_max_latency_ms: u64,

    /// Seed for reproducible mock results.
    #[arg(long)]
    pub mock_seed: Option<u64>,
}

impl EngineArgs {
    fn dispatch_config(&self) -> anyhow::Result<DispatchConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!(path = %path, "Loading dispatch configuration");
                DispatchConfig::from_yaml_file(path)?
            }
            None => DispatchConfig::from_env()?,
        };
        if let Some(max) = self.max_concurrency {
            config = config.with_max_concurrency(max);
        }
        config.validate()?;
        Ok(config)
    }

    fn mock_simulation(&self) -> MockSimulation {
        let mut config = MockSimulationConfig::default()
            .with_latency(
                Duration::from_millis(self.mock_min_latency_ms),
                Duration::from_millis(self.mock_max_latency_ms),
            )
            .with_failure_rate(self.mock_failure_rate);
        if let Some(seed) = self.mock_seed {
            config = config.with_seed(seed);
        }
        MockSimulation::new(config)
    }

    fn controller(
        &self,
        metrics: Option<Arc<DispatchMetrics>>,
    ) -> anyhow::Result<DispatchController> {
        let config = self.dispatch_config()?;
        info!(
            max_concurrency = config.max_concurrency,
            task_timeout_ms = config.task_timeout.as_millis() as u64,
            max_retries = config.max_retries,
            "Dispatch configuration loaded"
        );

        let mut builder =
            DispatchController::builder(Arc::new(self.mock_simulation())).config(config);
        if let Some(metrics) = metrics {
            builder = builder.observer(metrics);
        }
        Ok(builder.build()?)
    }
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Run(args) => run_dispatch_command(args).await,
    }
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let metrics = if args.no_metrics {
        None
    } else {
        Some(Arc::new(DispatchMetrics::new()?))
    };
    let controller = Arc::new(args.engine.controller(metrics.clone())?);

    let mut state = AppState::new(controller);
    if let Some(metrics) = metrics {
        state = state.with_metrics(metrics);
    }

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", args.bind, e))?;

    api::serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    })
    .await?;

    Ok(())
}

async fn run_dispatch_command(args: RunArgs) -> anyhow::Result<()> {
    let input = Path::new(&args.input);
    if !input.exists() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", args.input));
    }

    let body = fs::read(input)?;
    let request = DispatchRequest::from_slice(&body)?;
    let controller = args.engine.controller(None)?;

    let dispatched = request.dispatch(&controller).await;
    if let DispatchReply::Batch(response) = &dispatched.reply {
        info!(
            total = response.summary.total,
            successful = response.summary.successful,
            failed = response.summary.failed,
            duration_ms = response.summary.duration,
            "Batch finished"
        );
    }
    let rendered = serde_json::to_string_pretty(&dispatched.reply)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered)?;
            info!(path = %path, "Response written");
        }
        None => println!("{}", rendered),
    }

    if let Some(error) = dispatched.fatal {
        warn!(error = %error, "Batch aborted");
        return Err(error.into());
    }
    Ok(())
}
