//! Backtest runner — wires together the simulator, benchmark lookup and metrics.
//!
//! Two entry points:
//! - `run_backtest()`: one uninterruptible run. Used by sweeps and walk-forward.
//! - `run_backtest_with_cancel()`: same, with a cooperative cancel token. Used
//!   by the CLI and the scheduler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use backlab_core::domain::{EquityCurve, TradeRecord};
use backlab_core::engine::RunLog;
use backlab_core::{BacktestConfig, CancelToken, ExecutionSimulator, PriceFeed, SimError, Strategy};

use crate::benchmark::benchmark_series;
use crate::metrics::{PerformanceAnalyzer, PerformanceMetrics};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("simulation error: {0}")]
    Sim(#[from] SimError),
    #[error("benchmark symbol '{0}' not found in price feed")]
    UnknownBenchmark(String),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_fingerprint: String,
    pub strategy: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_value: f64,
    pub final_cash: f64,
    pub metrics: PerformanceMetrics,
    pub equity_curve: EquityCurve,
    pub trades: Vec<TradeRecord>,
    pub run_log: RunLog,
    pub bar_count: usize,
    pub cancelled: bool,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run one strategy over one config and feed, then analyze the result.
pub fn run_backtest(
    config: &BacktestConfig,
    feed: &dyn PriceFeed,
    strategy: &dyn Strategy,
) -> Result<BacktestResult, RunError> {
    run_backtest_with_cancel(config, feed, strategy, CancelToken::new())
}

/// Like `run_backtest`, stopping between bars once `cancel` fires.
///
/// A cancelled run is still analyzed over the bars it completed.
pub fn run_backtest_with_cancel(
    config: &BacktestConfig,
    feed: &dyn PriceFeed,
    strategy: &dyn Strategy,
    cancel: CancelToken,
) -> Result<BacktestResult, RunError> {
    if let Some(symbol) = &config.benchmark {
        if feed.bars(symbol).is_none() {
            return Err(RunError::UnknownBenchmark(symbol.clone()));
        }
    }

    let run = ExecutionSimulator::new(config, feed, strategy)?
        .with_cancel(cancel)
        .run()?;

    let benchmark = config.benchmark.as_deref().and_then(|symbol| {
        let series = benchmark_series(feed, symbol, &run.equity_curve.dates());
        if series.is_none() {
            warn!(symbol, "benchmark has no valid closes; skipping comparison");
        }
        series
    });

    let metrics = PerformanceAnalyzer::new(config).analyze(
        &run.equity_curve,
        &run.trades,
        benchmark.as_deref(),
    );

    info!(
        strategy = strategy.name(),
        total_return = metrics.total_return,
        sharpe = metrics.sharpe,
        max_drawdown = metrics.max_drawdown,
        fills = metrics.trade_count,
        "backtest analyzed"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        config_fingerprint: config.fingerprint(),
        strategy: strategy.name().to_string(),
        start_date: config.start_date,
        end_date: config.end_date,
        initial_capital: config.initial_capital,
        final_value: run.final_ledger.total_value(),
        final_cash: run.final_ledger.cash(),
        metrics,
        equity_curve: run.equity_curve,
        trades: run.trades,
        run_log: run.run_log,
        bar_count: run.bar_count,
        cancelled: run.cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlab_core::data::synthetic_feed;
    use backlab_core::strategy::{BuyAndHold, EqualWeight};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn unknown_benchmark_is_rejected_before_running() {
        let feed = synthetic_feed(&["AAA"], start(), 30, 1);
        let end = *feed.dates().last().unwrap();
        let config = BacktestConfig::new(start(), end, 10_000.0).with_benchmark("SPY");
        let err = run_backtest(&config, &feed, &BuyAndHold::new("AAA")).unwrap_err();
        assert!(matches!(err, RunError::UnknownBenchmark(s) if s == "SPY"));
    }

    #[test]
    fn invalid_config_surfaces_as_sim_error() {
        let feed = synthetic_feed(&["AAA"], start(), 30, 1);
        let config = BacktestConfig::new(start(), start(), 10_000.0);
        let err = run_backtest(&config, &feed, &BuyAndHold::new("AAA")).unwrap_err();
        assert!(matches!(err, RunError::Sim(SimError::Config(_))));
    }

    #[test]
    fn result_carries_run_identity() {
        let feed = synthetic_feed(&["AAA", "BBB"], start(), 60, 9);
        let end = *feed.dates().last().unwrap();
        let config = BacktestConfig::new(start(), end, 50_000.0).with_benchmark("BBB");
        let result = run_backtest(&config, &feed, &EqualWeight::default()).unwrap();

        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.config_fingerprint, config.fingerprint());
        assert_eq!(result.bar_count, 60);
        assert_eq!(result.metrics.bar_count, 60);
        assert!(!result.cancelled);
        assert!((result.final_value - result.equity_curve.last().unwrap().total_value).abs() < 1e-6);
        assert!(result.metrics.tracking_error > 0.0);
    }

    #[test]
    fn no_benchmark_means_zero_tracking_stats() {
        let feed = synthetic_feed(&["AAA"], start(), 40, 4);
        let end = *feed.dates().last().unwrap();
        let config = BacktestConfig::new(start(), end, 10_000.0);
        let plain = run_backtest(&config, &feed, &BuyAndHold::new("AAA")).unwrap();
        assert_eq!(plain.metrics.tracking_error, 0.0);
        assert_eq!(plain.metrics.information_ratio, 0.0);
    }

    #[test]
    fn result_json_defaults_schema_version() {
        let feed = synthetic_feed(&["AAA"], start(), 10, 2);
        let end = *feed.dates().last().unwrap();
        let config = BacktestConfig::new(start(), end, 10_000.0);
        let result = run_backtest(&config, &feed, &BuyAndHold::new("AAA")).unwrap();

        let mut value = serde_json::to_value(&result).unwrap();
        value.as_object_mut().unwrap().remove("schema_version");
        let back: BacktestResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.schema_version, SCHEMA_VERSION);
        assert_eq!(back.trades.len(), result.trades.len());
        assert_eq!(back.bar_count, result.bar_count);
    }
}
