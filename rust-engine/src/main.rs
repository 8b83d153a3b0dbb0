use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ema_ha_backtest::config::{ExecutionMode, Settings};
use ema_ha_backtest::data::{self, MarketSeries};
use ema_ha_backtest::export::{ExportConfig, ResultsDocument, ResultsExporter};
use ema_ha_backtest::summary::render_report;
use ema_ha_backtest::sweep::{cross_validate, run_sweep, SweepOptions};
use ema_ha_backtest::synthetic::{generate_seeded, SyntheticSpec};
use ema_ha_backtest::types::{parse_pattern, TradingMode};
use ema_ha_backtest::versioning::RunManifest;

/// EMA crossover / Heikin-Ashi intraday backtester.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parameter sweep and write results.
    Backtest(BacktestArgs),
    /// Run the sweep sequentially and in parallel and compare the results.
    Validate(ValidateArgs),
    /// Write a seeded synthetic OHLC series as CSV.
    Generate(GenerateArgs),
}

#[derive(Parser)]
struct SweepArgs {
    /// Settings file (.json, .yaml or .yml). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OHLC CSV file. Defaults to `{data_folder}/{symbol}_{timeframe}.csv`.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Override the symbol from the settings.
    #[arg(long)]
    symbol: Option<String>,

    /// Restrict the sweep to one trading mode (BUY, SELL or SWING).
    #[arg(long)]
    mode: Option<TradingMode>,

    /// Restrict the sweep to one pattern length (2, 3 or None).
    #[arg(long)]
    pattern: Option<String>,

    /// Override the base seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long)]
    debug: bool,
}

#[derive(Parser)]
struct BacktestArgs {
    #[command(flatten)]
    sweep: SweepArgs,

    /// Run combinations one after another.
    #[arg(long)]
    sequential: bool,

    /// Results directory. Defaults to the settings' results folder.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write one trades CSV per combination.
    #[arg(long)]
    trades: bool,
}

#[derive(Parser)]
struct ValidateArgs {
    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(Parser)]
struct GenerateArgs {
    /// Destination CSV file.
    #[arg(long)]
    output: PathBuf,

    /// First calendar day (format: YYYY-MM-DD).
    #[arg(long, default_value = "2024-01-01")]
    start: NaiveDate,

    /// Calendar days to cover; weekends are skipped.
    #[arg(long, default_value_t = 30)]
    days: u32,

    /// Minutes between bars.
    #[arg(long, default_value_t = 1)]
    interval: u32,

    /// Per-bar standard deviation of returns.
    #[arg(long, default_value_t = 0.001)]
    volatility: f64,

    #[arg(long, default_value_t = 18_000.0)]
    initial_price: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest(args) => handle_backtest(args),
        Commands::Validate(args) => handle_validate(args),
        Commands::Generate(args) => {
            init_tracing(if args.debug { "debug" } else { "info" });
            handle_generate(args)
        }
    }
}

/// RUST_LOG wins over `level`.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Loads settings, applies command-line overrides and starts logging.
fn prepare(args: &SweepArgs) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let level = if args.debug { "debug".to_string() } else { settings.logging.level.clone() };
    init_tracing(&level);

    if let Some(symbol) = &args.symbol {
        settings.data.symbol = symbol.clone();
    }
    if let Some(mode) = args.mode {
        settings.override_mode(mode);
    }
    if let Some(pattern) = &args.pattern {
        settings.override_pattern(parse_pattern(pattern)?);
    }
    if let Some(seed) = args.seed {
        settings.execution.seed = seed;
    }
    settings.validate()?;
    Ok(settings)
}

fn load_series(args: &SweepArgs, settings: &Settings) -> Result<MarketSeries> {
    let path = args.data.clone().unwrap_or_else(|| data::default_data_path(settings));
    if !path.exists() {
        bail!(
            "data file {} not found; pass --data or create one with `generate --output {}`",
            path.display(),
            path.display()
        );
    }
    data::load_csv(&path).with_context(|| format!("loading market data from {}", path.display()))
}

fn handle_backtest(args: BacktestArgs) -> Result<()> {
    let mut settings = prepare(&args.sweep)?;
    if args.sequential {
        settings.execution.mode = ExecutionMode::Sequential;
    }
    let series = load_series(&args.sweep, &settings)?;
    let options = SweepOptions::from_settings(&settings).with_trades(args.trades);

    let started = Instant::now();
    let outcomes = run_sweep(&settings, &series.bars, &options)?;
    let duration_ms = started.elapsed().as_millis() as u64;

    let manifest = RunManifest::create(&settings, &series.bars, series.metadata.clone(), &outcomes, duration_ms)?;
    let output_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from(&settings.data.results_folder));
    let document = ResultsDocument {
        symbol: settings.data.symbol.clone(),
        timeframe: settings.data.timeframe.clone(),
        backtest_period: series.metadata,
        manifest,
        results: outcomes,
    };
    let files = ResultsExporter::new(ExportConfig::new(output_dir)).export(&document)?;

    println!("{}", render_report(&document.results));
    println!("Results: {}", files.results_json.display());
    println!("Summary: {}", files.summary_csv.display());
    if !files.trades_csv.is_empty() {
        println!("Trade files: {}", files.trades_csv.len());
    }
    info!(duration_ms, run_id = %document.manifest.run_id, "backtest run finished");
    Ok(())
}

fn handle_validate(args: ValidateArgs) -> Result<()> {
    let settings = prepare(&args.sweep)?;
    let series = load_series(&args.sweep, &settings)?;
    let report = cross_validate(&settings, &series.bars, &SweepOptions::from_settings(&settings))?;

    println!("Combinations:    {}", report.combinations);
    println!("Sequential hash: {}", report.sequential_hash);
    println!("Parallel hash:   {}", report.parallel_hash);
    if report.passed() {
        println!("Sequential and parallel results are identical.");
        return Ok(());
    }
    for m in &report.mismatches {
        let combination = m.combination.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        warn!(%combination, field = %m.field, sequential = %m.sequential, parallel = %m.parallel, "mismatch");
        println!("{combination}: {} sequential={} parallel={}", m.field, m.sequential, m.parallel);
    }
    bail!("cross-validation failed with {} mismatches", report.mismatches.len())
}

fn handle_generate(args: GenerateArgs) -> Result<()> {
    let spec = SyntheticSpec {
        start_date: args.start,
        days: args.days,
        interval_minutes: args.interval,
        volatility: args.volatility,
        initial_price: args.initial_price,
        ..SyntheticSpec::default()
    };
    let bars = generate_seeded(&spec, args.seed)?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&args.output, data::to_csv(&bars))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(bars = bars.len(), path = %args.output.display(), seed = args.seed, "wrote synthetic series");
    println!("Wrote {} bars to {}", bars.len(), args.output.display());
    Ok(())
}
