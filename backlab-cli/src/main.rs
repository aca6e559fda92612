//! Backlab CLI — run, walk-forward, sweep and schedule commands.
//!
//! Commands:
//! - `run` — simulate one strategy and save the artifact set
//! - `walk-forward` — rolling out-of-sample validation with recommendations
//! - `sweep` — momentum parameter grid, ranked by Sharpe
//! - `schedule` — rerun a backtest on a fixed interval, reloading prices each time
//!
//! Prices come from a long-format CSV (`--prices`) or a seeded synthetic feed
//! (`--synthetic SPY,QQQ`). Run settings come from a TOML file (`--config`)
//! whose top level is a `BacktestConfig`, with optional `[strategy]` and
//! `[walk_forward]` tables.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backlab_core::data::{load_csv_path, sanity_rules, synthetic_feed};
use backlab_core::strategy::StrategyConfig;
use backlab_core::{AlignedFeed, BacktestConfig, PriceFeed};
use backlab_runner::export::{describe_recommendation, save_artifacts, save_walk_forward};
use backlab_runner::{
    run_backtest, run_backtest_with_cancel, run_walk_forward, BacktestResult, ParamGrid,
    ParamSweep, Scheduler, WalkForwardConfig, WalkForwardResult,
};

#[derive(Parser)]
#[command(name = "backlab", about = "Backlab — event-driven portfolio backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one strategy and save trades, equity and metrics.
    Run {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Validate a strategy over rolling train/test windows.
    WalkForward {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Bars per training window (overrides the config file).
        #[arg(long)]
        train: Option<usize>,
        /// Bars per test window (overrides the config file).
        #[arg(long)]
        test: Option<usize>,
        /// Bars between window starts (overrides the config file).
        #[arg(long)]
        step: Option<usize>,
        /// Output directory for walk_forward.json and windows.csv.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Sweep momentum lookback, top-N and commission over a default grid.
    Sweep {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        /// How many of the best cases to print.
        #[arg(long, default_value_t = 5)]
        top: usize,
        /// Run cases one at a time instead of on the thread pool.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Rerun a backtest every interval, reloading the price file each time.
    Schedule {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Seconds between runs.
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
        /// Stop after this many runs.
        #[arg(long, default_value_t = 1)]
        runs: usize,
        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
}

/// Where prices come from.
#[derive(Args, Clone)]
struct DataArgs {
    /// Long-format price CSV: date,symbol,open,high,low,close,volume.
    #[arg(long, conflicts_with = "synthetic")]
    prices: Option<PathBuf>,

    /// Comma-separated symbols for a seeded random-walk feed.
    #[arg(long, value_delimiter = ',')]
    synthetic: Vec<String>,

    /// Bars per synthetic symbol.
    #[arg(long, default_value_t = 756)]
    bars: usize,

    /// Seed for the synthetic feed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// First synthetic date (YYYY-MM-DD).
    #[arg(long, default_value = "2020-01-01")]
    synthetic_start: NaiveDate,
}

/// Run settings: a config file, command-line overrides, or both.
#[derive(Args, Clone)]
struct SettingsArgs {
    /// TOML config file (BacktestConfig plus optional [strategy] and [walk_forward]).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy shorthand: buy_and_hold:SPY, equal_weight, equal_weight:SPY,QQQ, momentum:20:3.
    #[arg(long)]
    strategy: Option<String>,

    /// Initial capital when no config file is given.
    #[arg(long, default_value_t = 100_000.0)]
    capital: f64,

    /// Commission rate when no config file is given.
    #[arg(long, default_value_t = 0.001)]
    commission: f64,

    /// Slippage rate when no config file is given.
    #[arg(long, default_value_t = 0.0005)]
    slippage: f64,

    /// Benchmark symbol (overrides the config file).
    #[arg(long)]
    benchmark: Option<String>,
}

/// Optional tables alongside the top-level `BacktestConfig` keys.
#[derive(Debug, Default, Deserialize)]
struct ConfigSections {
    strategy: Option<StrategyConfig>,
    walk_forward: Option<WalkForwardConfig>,
}

struct Settings {
    config: BacktestConfig,
    strategy: StrategyConfig,
    walk_forward: WalkForwardConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            settings,
            output_dir,
        } => run_cmd(&data, &settings, &output_dir),
        Commands::WalkForward {
            data,
            settings,
            train,
            test,
            step,
            output_dir,
        } => walk_forward_cmd(&data, &settings, [train, test, step], &output_dir),
        Commands::Sweep {
            data,
            settings,
            top,
            sequential,
        } => sweep_cmd(&data, &settings, top, sequential),
        Commands::Schedule {
            data,
            settings,
            interval_secs,
            runs,
            output_dir,
        } => schedule_cmd(data, settings, interval_secs, runs, output_dir),
    }
}

// ─── Commands ────────────────────────────────────────────────────────

fn run_cmd(data: &DataArgs, args: &SettingsArgs, output_dir: &Path) -> Result<()> {
    let feed = load_feed(data)?;
    let settings = resolve_settings(args, &feed)?;
    let strategy = settings.strategy.build();

    let result = run_backtest(&settings.config, &feed, strategy.as_ref())
        .context("backtest failed")?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn walk_forward_cmd(
    data: &DataArgs,
    args: &SettingsArgs,
    [train, test, step]: [Option<usize>; 3],
    output_dir: &Path,
) -> Result<()> {
    let feed = load_feed(data)?;
    let mut settings = resolve_settings(args, &feed)?;
    let wf = &mut settings.walk_forward;
    if let Some(train) = train {
        wf.train_period = train;
    }
    if let Some(test) = test {
        wf.test_period = test;
    }
    if let Some(step) = step {
        wf.step_size = step;
    }
    let strategy = settings.strategy.build();

    let result = run_walk_forward(&settings.config, &settings.walk_forward, &feed, strategy.as_ref())
        .context("walk-forward validation failed")?;
    print_walk_forward(&result);

    let dir = save_walk_forward(&result, output_dir)?;
    println!("Walk-forward results saved to: {}", dir.display());
    Ok(())
}

fn sweep_cmd(data: &DataArgs, args: &SettingsArgs, top: usize, sequential: bool) -> Result<()> {
    let feed = load_feed(data)?;
    let settings = resolve_settings(args, &feed)?;
    let grid = ParamGrid::momentum_default();
    info!(cases = grid.size(), "starting sweep");

    let results = ParamSweep::new()
        .with_parallelism(!sequential)
        .sweep(&grid, &settings.config, &feed)
        .context("sweep failed")?;

    println!();
    println!("=== Sweep: top {} of {} ===", top.min(results.len()), results.len());
    println!(
        "{:<28} {:>10} {:>8} {:>10} {:>8}",
        "Case", "Return", "Sharpe", "Max DD", "Trades"
    );
    println!("{}", "-".repeat(68));
    for (label, result) in results.top_n(top) {
        let m = &result.metrics;
        println!(
            "{:<28} {:>9.2}% {:>8.3} {:>9.2}% {:>8}",
            label,
            m.total_return * 100.0,
            m.sharpe,
            m.max_drawdown * 100.0,
            m.trade_count
        );
    }
    println!();
    Ok(())
}

fn schedule_cmd(
    data: DataArgs,
    args: SettingsArgs,
    interval_secs: u64,
    runs: usize,
    output_dir: PathBuf,
) -> Result<()> {
    if runs == 0 {
        bail!("--runs must be at least 1");
    }
    // Fail fast on bad input before the first interval elapses.
    let settings = resolve_settings(&args, &load_feed(&data)?)?;
    let (done_tx, done_rx) = mpsc::channel::<Result<PathBuf>>();

    let scheduler = Scheduler::start(
        "backlab-schedule",
        Duration::from_secs(interval_secs),
        move |cancel| {
            let outcome = load_feed(&data).and_then(|feed| {
                let strategy = settings.strategy.build();
                let result = run_backtest_with_cancel(
                    &settings.config,
                    &feed,
                    strategy.as_ref(),
                    cancel.clone(),
                )?;
                if result.cancelled {
                    bail!("run cancelled after {} bars", result.bar_count);
                }
                print_summary(&result);
                save_artifacts(&result, &output_dir)
            });
            let _ = done_tx.send(outcome);
        },
    )?;
    info!(interval_secs, runs, "scheduler started");

    for run in 1..=runs {
        let outcome = done_rx
            .recv()
            .context("scheduler stopped before finishing its runs")?;
        match outcome {
            Ok(dir) => println!("Run {run}/{runs} saved to: {}", dir.display()),
            Err(e) => warn!(run, error = %format!("{e:#}"), "scheduled run failed"),
        }
    }

    let completed = scheduler.stop()?;
    info!(completed, "scheduler stopped");
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn load_feed(data: &DataArgs) -> Result<AlignedFeed> {
    if let Some(path) = &data.prices {
        let report = load_csv_path(path, &sanity_rules())
            .with_context(|| format!("failed to load prices from {}", path.display()))?;
        for violation in &report.violations {
            warn!(?violation, "voided price row");
        }
        return Ok(report.feed);
    }
    if data.synthetic.is_empty() {
        bail!("one of --prices or --synthetic is required");
    }
    let symbols: Vec<&str> = data.synthetic.iter().map(String::as_str).collect();
    let feed = synthetic_feed(&symbols, data.synthetic_start, data.bars, data.seed);
    info!(symbols = symbols.len(), bars = data.bars, seed = data.seed, "generated synthetic feed");
    Ok(feed)
}

/// Merge the config file (if any) with command-line flags.
///
/// Without a config file the date range spans the whole feed.
fn resolve_settings(args: &SettingsArgs, feed: &dyn PriceFeed) -> Result<Settings> {
    let (mut config, sections) = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config = BacktestConfig::from_toml_str(&content)
                .with_context(|| format!("invalid config in {}", path.display()))?;
            let sections: ConfigSections = toml::from_str(&content)
                .with_context(|| format!("invalid [strategy]/[walk_forward] in {}", path.display()))?;
            (config, sections)
        }
        None => {
            let (Some(&start), Some(&end)) = (feed.dates().first(), feed.dates().last()) else {
                bail!("price feed is empty");
            };
            let config = BacktestConfig::new(start, end, args.capital)
                .with_costs(args.commission, args.slippage);
            (config, ConfigSections::default())
        }
    };
    if let Some(symbol) = &args.benchmark {
        config.benchmark = Some(symbol.clone());
    }
    config.validate().context("invalid backtest settings")?;

    let strategy = match (&args.strategy, sections.strategy) {
        (Some(shorthand), _) => StrategyConfig::parse_shorthand(shorthand)
            .with_context(|| format!("invalid --strategy '{shorthand}'"))?,
        (None, Some(strategy)) => strategy,
        (None, None) => StrategyConfig::EqualWeight { symbols: Vec::new() },
    };

    Ok(Settings {
        config,
        strategy,
        walk_forward: sections.walk_forward.unwrap_or_default(),
    })
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Period:         {} to {}", result.start_date, result.end_date);
    println!("Bars:           {}", result.bar_count);
    println!("Trades:         {}", m.trade_count);
    println!("Skipped orders: {}", result.run_log.len());
    println!();
    println!("--- Performance ---");
    println!("Final Value:    {:.2}", result.final_value);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Annual Return:  {:.2}%", m.annual_return * 100.0);
    println!("Volatility:     {:.2}%", m.annual_volatility * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    if let Some(bars) = m.drawdown.recovery_bars {
        println!("Recovery:       {bars} bars");
    }
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Commission:     {:.2}", m.costs.total_commission);
    println!("Slippage:       {:.2}", m.costs.total_slippage);
    for v in &m.var {
        println!(
            "VaR {:>4.1}%:     {:.2}% (hist {:.2}%, CVaR {:.2}%)",
            v.confidence * 100.0,
            v.parametric * 100.0,
            v.historical * 100.0,
            v.cvar * 100.0
        );
    }
    if m.tracking_error > 0.0 {
        println!("Info Ratio:     {:.3}", m.information_ratio);
        println!("Track Error:    {:.2}%", m.tracking_error * 100.0);
    }
    if result.cancelled {
        println!();
        println!("WARNING: run was cancelled before the last bar");
    }
    println!();
}

fn print_walk_forward(result: &WalkForwardResult) {
    let s = &result.summary;
    println!();
    println!("=== Walk-Forward: {} ===", result.strategy);
    println!(
        "Train/Test/Step: {}/{}/{} bars",
        result.config.train_period, result.config.test_period, result.config.step_size
    );
    println!();
    println!(
        "{:>3} {:<12} {:<12} {:>10} {:>8} {:>10} {:>7}",
        "#", "Test Start", "Test End", "Return", "Sharpe", "Max DD", "Trades"
    );
    println!("{}", "-".repeat(68));
    for w in &result.windows {
        println!(
            "{:>3} {:<12} {:<12} {:>9.2}% {:>8.3} {:>9.2}% {:>7}",
            w.index,
            w.test_start.to_string(),
            w.test_end.to_string(),
            w.total_return * 100.0,
            w.sharpe,
            w.max_drawdown * 100.0,
            w.trade_count
        );
    }
    println!();
    println!("Windows:        {}", s.window_count);
    println!("Mean Return:    {:.2}%", s.mean_return * 100.0);
    println!("Profitable:     {:.0}%", s.profitable_fraction * 100.0);
    println!("Mean Max DD:    {:.2}%", s.mean_max_drawdown * 100.0);
    println!(
        "Robustness:     {:.2} ({})",
        s.robustness_score,
        if s.robust { "robust" } else { "not robust" }
    );
    for rec in &result.recommendations {
        println!("  - {}", describe_recommendation(rec));
    }
    println!();
}
