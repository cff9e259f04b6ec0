/* src/main.rs */
#![warn(missing_docs)]
//! # Cadence CLI - Real-Time Computational Load Harness
//!
//! Command-line shell over the cadence library: full resolution runs, single phases,
//! and configuration inspection. Reports go to stdout (or `--output`), logs go to
//! stderr and optionally to a daily rolling file.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadence::{
    report::BaselinePerformance, CostMode, ExecutionMode, HarnessConfig, OptimizationResult, ResolutionHarness,
    RunPhase, SustainedRunRecord,
};

// =====================================================================================
// CLI CONFIGURATION & ARGUMENTS
// =====================================================================================

/// Cadence CLI - Real-Time Computational Load Harness
#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    version = env!("CARGO_PKG_VERSION"),
    author = "Lord Xyn <lord.xyn@proton.me>",
    about = "Cycle profiling, sustained real-time trials, load factor optimization and resolution assessment"
)]
struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "CADENCE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Configuration file path (YAML or JSON)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, default_value = "json", global = true)]
    output_format: OutputFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Override the root seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Override the workload execution mode
    #[arg(long, global = true)]
    execution_mode: Option<ModeArg>,

    /// Charge a synthetic cost per operation instead of running the kernels
    #[arg(long, global = true, value_name = "NANOS_PER_OP")]
    modeled: Option<f64>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Baseline, sustained run, optimization and assessment
    Run,

    /// Measure one monitored cycle at load factor 1.0
    Baseline,

    /// Run only the sustained trial
    Sustained {
        /// Deadline in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Iteration cap
        #[arg(short, long)]
        iterations: Option<u64>,
    },

    /// Run only the load factor search
    Optimize {
        /// Trial budget
        #[arg(short = 't', long)]
        max_trials: Option<u32>,

        /// Concurrent trials
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

/// Log level configuration
#[derive(ValueEnum, Clone, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Log line format
#[derive(ValueEnum, Clone, Debug, PartialEq)]
enum LogFormat {
    Text,
    Json,
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Json,
    Yaml,
    Binary,
    Text,
}

/// Execution mode selector
#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Sequential,
    Parallel,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Parallel => ExecutionMode::Parallel,
        }
    }
}

// =====================================================================================
// OUTPUT
// =====================================================================================

/// Encode a result in the requested format.
fn encode<T: Serialize>(value: &T, format: OutputFormat, text: impl FnOnce(&T) -> Result<String>) -> Result<Vec<u8>> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?.into_bytes(),
        OutputFormat::Yaml => serde_yaml::to_string(value)?.into_bytes(),
        OutputFormat::Text => text(value)?.into_bytes(),
        OutputFormat::Binary => bincode::serialize(value)?,
    })
}

/// Write encoded output to a file or stdout.
fn emit(data: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, data).with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!("Output written to: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn baseline_text(baseline: &BaselinePerformance) -> String {
    let m = &baseline.measurement;
    let mut out = format!("=== BASELINE {} ===\n", baseline.run_id);
    for w in &baseline.workloads {
        out.push_str(&format!(
            "  {:<24} n={:<5} {:.6}s\n",
            w.name, w.effective_size, w.computation_time
        ));
    }
    out.push_str(&format!("Total Time: {:.6}s\n", m.total_time));
    out.push_str(&format!("Real-Time Ratio: {:.4}\n", m.real_time_ratio));
    out.push_str(&format!("Parallel Efficiency: {:.4}\n", m.parallel_efficiency));
    out
}

fn sustained_text(record: &SustainedRunRecord) -> String {
    format!(
        "=== SUSTAINED {} ===\nIterations: {} in {:.3}s ({:?}, {:?} clock)\nAchieved Frequency: {:.2} Hz (ratio {:.4})\nEfficiency: mean {:.4}, min {:.4}\nStability: {:.4}\nDiscarded Cycles: {}\nPartial: {}\n",
        record.run_id,
        record.iteration_count,
        record.duration,
        record.stop_reason,
        record.clock,
        record.achieved_frequency,
        record.frequency_ratio,
        record.mean_efficiency,
        record.min_efficiency,
        record.stability,
        record.discarded_cycles,
        record.partial,
    )
}

fn optimization_text(result: &OptimizationResult) -> String {
    let factors: Vec<String> = result.optimized_load_factors.iter().map(|lf| format!("{lf:.2}")).collect();
    let mut out = format!(
        "=== OPTIMIZATION {} ===\nSuccess: {} after {} trials\nBaseline Total: {:.6}s\nOptimized Total: {:.6}s\nImprovement: {:.2}%\nLoad Factors: [{}]\n",
        result.run_id,
        result.success,
        result.trials_used,
        result.baseline.total_time,
        result.optimized.total_time,
        result.performance_improvement * 100.0,
        factors.join(", "),
    );
    if let Some(reason) = &result.reason {
        out.push_str(&format!("Reason: {reason}\n"));
    }
    out
}

// =====================================================================================
// COMMANDS
// =====================================================================================

/// Run harness work on the blocking pool.
async fn blocking<T, F>(harness: Arc<ResolutionHarness>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ResolutionHarness) -> cadence::Result<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || work(&harness))
        .await
        .context("Harness task failed")??;
    Ok(value)
}

/// Execute a subcommand against a validated harness.
async fn dispatch(args: &Args, harness: Arc<ResolutionHarness>, cancel: CancellationToken) -> Result<Vec<u8>> {
    let format = args.output_format;
    match &args.command {
        Commands::Run => {
            let report = harness.run(cancel).await?;
            encode(&report, format, |r| Ok(r.to_text_format()))
        }
        Commands::Baseline => {
            let baseline = blocking(harness, |h| {
                let mut evolver = h.evolver()?;
                let run_id = h.root_run_id().child(RunPhase::Baseline, 0);
                h.baseline(&mut evolver, &h.initial_load_factors(), run_id)
            })
            .await?;
            encode(&baseline, format, |b| Ok(baseline_text(b)))
        }
        Commands::Sustained { .. } => {
            let record = blocking(harness, move |h| {
                let mut evolver = h.evolver()?;
                let run_id = h.root_run_id().child(RunPhase::Sustained, 0);
                h.sustained(&mut evolver, &h.initial_load_factors(), run_id, &cancel)
            })
            .await?;
            encode(&record, format, |r| Ok(sustained_text(r)))
        }
        Commands::Optimize { .. } => {
            let result = blocking(harness, move |h| {
                let evolver = h.evolver()?;
                let run_id = h.root_run_id().child(RunPhase::Trial, 0);
                h.optimize(&evolver, &h.initial_load_factors(), run_id, &cancel)
            })
            .await?;
            encode(&result, format, |r| Ok(optimization_text(r)))
        }
        Commands::Config => encode(harness.config(), format, |c| {
            serde_yaml::to_string(c).context("Failed to render configuration as YAML")
        }),
    }
}

// =====================================================================================
// MAIN APPLICATION ENTRY POINT
// =====================================================================================

/// Setup logging configuration. The returned guard flushes the file writer on drop.
fn setup_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let level = Level::from(args.log_level.clone());

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (text_layer, json_layer) = match args.log_format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            ),
            None,
        ),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(io::stderr).with_current_span(true))),
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "cadence.log"));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Load the harness configuration, falling back to the defaults.
async fn load_config(config_path: Option<&Path>) -> Result<HarnessConfig> {
    match config_path {
        Some(path) => {
            let path = path.to_path_buf();
            let display = path.display().to_string();
            tokio::task::spawn_blocking(move || HarnessConfig::from_path(&path))
                .await
                .context("Config loader task failed")?
                .with_context(|| format!("Failed to load config file: {display}"))
        }
        None => Ok(HarnessConfig::default()),
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut HarnessConfig, args: &Args) {
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(mode) = args.execution_mode {
        config.execution_mode = mode.into();
    }
    if let Some(nanos_per_op) = args.modeled {
        config.cost_mode = CostMode::Modeled { nanos_per_op, noise: 0.0 };
    }
    match &args.command {
        Commands::Sustained { duration, iterations } => {
            if let Some(duration) = duration {
                config.sustained.duration_secs = *duration;
            }
            if let Some(iterations) = iterations {
                config.sustained.iteration_cap = *iterations;
            }
        }
        Commands::Optimize { max_trials, concurrency } => {
            if let Some(max_trials) = max_trials {
                config.optimizer.max_trials = *max_trials;
            }
            if let Some(concurrency) = concurrency {
                config.optimizer.trial_concurrency = *concurrency;
            }
        }
        Commands::Run | Commands::Baseline | Commands::Config => {}
    }
}

// =====================================================================================
// MAIN FUNCTION
// =====================================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Setup logging; keep the guard alive until exit
    let _log_guard = setup_logging(&args)?;

    // Load and validate configuration
    let mut config = load_config(args.config.as_deref()).await?;
    apply_overrides(&mut config, &args);
    let harness = Arc::new(ResolutionHarness::new(config).context("Invalid harness configuration")?);

    // Ctrl-C stops scheduling new work; in-flight measurements finish
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight measurements");
                cancel.cancel();
            }
        })
    };

    let result = dispatch(&args, harness, cancel).await;
    interrupt.abort();

    let data = result?;
    emit(&data, args.output.as_deref())?;

    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_config_text_output_is_yaml() {
        let config = HarnessConfig::default();
        let bytes = encode(&config, OutputFormat::Text, |c| {
            serde_yaml::to_string(c).context("Failed to render configuration as YAML")
        })
        .expect("encode");
        let parsed: HarnessConfig = serde_yaml::from_slice(&bytes).expect("yaml");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_text_formatter_errors_propagate() {
        let result = encode(&HarnessConfig::default(), OutputFormat::Text, |_| Err(anyhow::anyhow!("render failed")));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_config_uses_library_loader() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
        let config = HarnessConfig { seed: 99, ..HarnessConfig::default() };
        file.write_all(serde_yaml::to_string(&config).expect("yaml").as_bytes()).expect("write");
        let loaded = load_config(Some(file.path())).await.expect("load");
        assert_eq!(loaded, config);

        let mut invalid = tempfile::Builder::new().suffix(".json").tempfile().expect("tempfile");
        let broken = HarnessConfig { target_frequency: 0.0, ..HarnessConfig::default() };
        invalid.write_all(serde_json::to_string(&broken).expect("json").as_bytes()).expect("write");
        assert!(load_config(Some(invalid.path())).await.is_err());

        assert_eq!(load_config(None).await.expect("default"), HarnessConfig::default());
    }
}
