//! Backlab Runner — performance analytics, walk-forward validation, sweeps, export.
//!
//! This crate builds on `backlab-core` to provide:
//! - Performance metrics (returns, Sharpe/Sortino, drawdown with recovery)
//! - Tail risk (parametric and historical VaR, CVaR) and benchmark comparison
//! - Trading-cost summaries
//! - Single-run orchestration with schema-versioned results
//! - Walk-forward validation with robustness scoring and recommendations
//! - Parallel parameter sweeps
//! - JSON/CSV/Markdown artifact export
//! - A channel-driven periodic scheduler

pub mod benchmark;
pub mod costs;
pub mod export;
pub mod metrics;
pub mod risk;
pub mod runner;
pub mod scheduler;
pub mod sweep;
pub mod walk_forward;

pub use benchmark::{benchmark_series, tracking_stats, TrackingStats};
pub use costs::{summarize_costs, CostSummary, PeriodCost};
pub use metrics::{DrawdownStats, PerformanceAnalyzer, PerformanceMetrics};
pub use risk::{normal_quantile, var_estimates, VarEstimate};
pub use runner::{run_backtest, run_backtest_with_cancel, BacktestResult, RunError, SCHEMA_VERSION};
pub use scheduler::{Scheduler, SchedulerError};
pub use sweep::{ParamGrid, ParamSweep, SweepCase, SweepResults};
pub use walk_forward::{
    aggregate_windows, create_windows, recommend, run_walk_forward, Recommendation,
    WalkForwardConfig, WalkForwardError, WalkForwardResult, WalkForwardSummary, WindowResult,
    WindowSpec,
};
