use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecast_bench::config::{Config, OutputFormat};
use forecast_bench::io::load_panel_csv;
use forecast_bench::telemetry::{init_tracing, shutdown_signal};
use forecast_bench::{BenchmarkPipeline, PipelineError};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "forecast-bench")]
#[command(about = "Benchmark a hosted forecasting API against statistical baselines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, forecast and score a panel
    Run {
        /// Configuration file (TOML)
        #[arg(short, long, env = "FCB_CONFIG")]
        config: Option<PathBuf>,

        /// Panel CSV, overrides data.path
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output format, overrides output.format
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    match Cli::parse().command {
        Commands::Run { config, data, format } => run(config, data, format).await,
    }
}

async fn run(config: Option<PathBuf>, data: Option<PathBuf>, format: Option<OutputFormat>) -> Result<()> {
    let mut cfg = Config::load(config.as_deref())?;
    if let Some(path) = data {
        cfg.data.path = path;
    }
    if let Some(format) = format {
        cfg.output.format = format;
    }
    if cfg.remote.enabled && cfg.remote.api_key.is_none() {
        warn!("remote provider enabled without an API key");
    }

    let panel = load_panel_csv(&cfg.data.path, &cfg.data)
        .with_context(|| format!("failed to load panel from {}", cfg.data.path.display()))?;
    let pipeline = BenchmarkPipeline::from_config(&cfg)?;

    let report = tokio::select! {
        report = pipeline.run(&panel) => report?,
        _ = shutdown_signal() => return Err(PipelineError::Cancelled.into()),
    };

    match cfg.output.format {
        OutputFormat::Table => {
            print!("{}", report.summary);
            for metric in &cfg.pipeline.metrics {
                if let Some(best) = report.summary.best_model(&metric.to_string()) {
                    println!("best {}: {} ({:.4})", best.metric, best.model, best.value);
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    info!(
        gaps = report.evaluation.gaps.len(),
        provider_failures = report.provider_failures.len(),
        "run complete"
    );
    Ok(())
}
