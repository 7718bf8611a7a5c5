//! CLI Entry Point for strobe_daq
//!
//! Provides a headless runner for the streaming pipeline:
//! - `run`: drive the synthetic fringe source through acquisition and processing,
//!   consume the display and reduced outputs, print periodic statistics
//! - `check-config`: load and validate a configuration file
//!
//! # Usage
//!
//! ```bash
//! strobe_daq --config config/strobe_daq.toml run --duration 10
//! strobe_daq run --duration 20 --set pulsation=12.566 --set-after 5
//! strobe_daq check-config --config config/strobe_daq.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::time::Duration;
use strobe_daq::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use strobe_daq::core::ReducedFrame;
use strobe_daq::data::reconfig::ReconfigMessage;
use strobe_daq::hardware::SyntheticFringeSource;
use strobe_daq::logging;
use strobe_daq::pipeline::Pipeline;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "strobe_daq")]
#[command(about = "Streaming frame acquisition with live statistics and demodulation", long_about = None)]
struct Cli {
    /// Configuration file (TOML); STROBE_DAQ_* environment variables override it
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on the synthetic source
    Run {
        /// Seconds to run; runs until Ctrl-C when omitted
        #[arg(long)]
        duration: Option<f64>,

        /// Reducer parameter update applied while running (repeatable), e.g. pulsation=6.28
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Seconds after start at which the `--set` updates are sent
        #[arg(long, default_value = "1.0")]
        set_after: f64,

        /// Seconds between two statistics reports
        #[arg(long, default_value = "1.0")]
        stats_interval: f64,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::Run {
            duration,
            set,
            set_after,
            stats_interval,
        } => {
            config.validate()?;
            logging::init_from_config(&config)?;
            run(config, duration, set, set_after, stats_interval).await
        }
    }
}

fn check_config(config: &PipelineConfig) -> Result<()> {
    config.validate()?;
    println!("{}", toml::to_string_pretty(config)?);
    println!("Configuration OK");
    Ok(())
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {what}: {value}"))
}

async fn run(
    config: PipelineConfig,
    duration: Option<f64>,
    set: Vec<String>,
    set_after: f64,
    stats_interval: f64,
) -> Result<()> {
    // Parse updates before starting anything so typos fail fast
    let mut pending = if set.is_empty() {
        None
    } else {
        Some(ReconfigMessage::from_pairs(&set)?)
    };

    let started = Instant::now();
    let deadline = duration
        .map(|d| seconds(d, "duration"))
        .transpose()?
        .map(|d| started + d);
    let set_at = started + seconds(set_after, "set-after")?;

    let source = Box::new(SyntheticFringeSource::from_config(&config.source));
    let mut pipeline = Pipeline::start(&config, source)?;

    let mut consume = interval(Duration::from_millis(5));
    consume.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(seconds(stats_interval, "stats-interval")?.max(Duration::from_millis(10)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut displayed = 0u64;
    let mut reduced = 0u64;
    let mut last_mean: Option<f64> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            _ = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => break,
            _ = consume.tick() => {
                while pipeline.display().try_receive().is_some() {
                    displayed += 1;
                }
                while let Some(output) = pipeline.output().try_receive() {
                    reduced += 1;
                    last_mean = match &output.frame {
                        ReducedFrame::Real(image) => image.mean(),
                        ReducedFrame::Complex(image) => image.mean().map(|c| c.norm()),
                    };
                }
                if Instant::now() >= set_at {
                    if let Some(message) = pending.take() {
                        match pipeline.reconfig().send(message) {
                            Ok(()) => info!(updates = ?set, "Reconfiguration sent"),
                            Err(e) => warn!("Reconfiguration rejected: {}", e),
                        }
                    }
                }
            }
            _ = report.tick() => {
                let acquisition = pipeline.acquisition_stats();
                let processing = pipeline.processing_stats();
                info!(
                    status = %acquisition.status,
                    acquired = acquisition.frames_acquired,
                    dropped = acquisition.total_dropped(),
                    processed = processing.samples_processed,
                    emitted = processing.outputs_emitted,
                    weight_violations = processing.weight_violations,
                    displayed,
                    reduced,
                    last_mean = ?last_mean,
                    "Pipeline statistics"
                );
                if acquisition.status.is_terminal() {
                    warn!(status = %acquisition.status, "Acquisition is no longer running");
                    break;
                }
            }
        }
    }

    pipeline.shutdown()?;
    println!(
        "Displayed {} frames, received {} reduced outputs in {:.1}s",
        displayed,
        reduced,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
