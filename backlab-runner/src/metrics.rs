//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity values and/or trade log in, scalar
//! out. `PerformanceAnalyzer` bundles them with the per-run settings
//! (annualization, risk-free rate, VaR levels) so a run is analyzed the same
//! way every time. Degenerate inputs produce 0, never NaN.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use backlab_core::domain::{EquityCurve, TradeRecord};
use backlab_core::BacktestConfig;

use crate::benchmark::{tracking_stats, TrackingStats};
use crate::costs::{summarize_costs, CostSummary};
use crate::risk::{var_estimates, VarEstimate};

/// Cap applied to profit factor when there are no losing fills.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Peak-to-trough statistics for the deepest drawdown of a curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownStats {
    /// Largest decline from a running peak, as a positive fraction.
    pub max_drawdown: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// Bars from peak to trough.
    pub duration_bars: usize,
    /// First date the curve closes above the prior peak, if it ever does.
    pub recovery_date: Option<NaiveDate>,
    /// Bars from trough to recovery.
    pub recovery_bars: Option<usize>,
}

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub drawdown: DrawdownStats,
    pub var: Vec<VarEstimate>,
    pub information_ratio: f64,
    pub tracking_error: f64,
    pub costs: CostSummary,
    pub trade_count: usize,
    pub closing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub bar_count: usize,
}

/// Computes `PerformanceMetrics` with the settings of one `BacktestConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceAnalyzer {
    initial_capital: f64,
    annualization: f64,
    risk_free_rate: f64,
    var_confidence: Vec<f64>,
}

impl PerformanceAnalyzer {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            initial_capital: config.initial_capital,
            annualization: config.bar_frequency.annualization_factor(),
            risk_free_rate: config.risk_free_rate,
            var_confidence: config.var_confidence.clone(),
        }
    }

    pub fn annualization(&self) -> f64 {
        self.annualization
    }

    /// Analyze one run.
    ///
    /// `benchmark` is a price series aligned with the curve's dates; without
    /// it the information ratio and tracking error are 0.
    pub fn analyze(
        &self,
        curve: &EquityCurve,
        trades: &[TradeRecord],
        benchmark: Option<&[f64]>,
    ) -> PerformanceMetrics {
        let values = curve.values();
        let dates = curve.dates();
        let returns = period_returns(&values);

        let annual_return = annual_return(&returns, self.annualization);
        let annual_volatility = annual_volatility(&returns, self.annualization);
        let drawdown = drawdown_stats(&values, &dates);

        let TrackingStats {
            information_ratio,
            tracking_error,
        } = benchmark
            .map(|prices| tracking_stats(&returns, &period_returns(prices), self.annualization))
            .unwrap_or_default();

        PerformanceMetrics {
            total_return: total_return(&values, self.initial_capital),
            annual_return,
            annual_volatility,
            sharpe: sharpe_ratio(&returns, self.annualization, self.risk_free_rate),
            sortino: sortino_ratio(&returns, self.annualization, self.risk_free_rate),
            max_drawdown: drawdown.max_drawdown,
            drawdown,
            var: var_estimates(&returns, &self.var_confidence),
            information_ratio,
            tracking_error,
            costs: summarize_costs(trades, &values),
            trade_count: trades.len(),
            closing_trades: trades.iter().filter(|t| t.is_closing()).count(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            bar_count: values.len(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction of starting capital.
pub fn total_return(equity_curve: &[f64], initial_capital: f64) -> f64 {
    match equity_curve.last() {
        Some(&last) if initial_capital > 0.0 => (last - initial_capital) / initial_capital,
        _ => 0.0,
    }
}

/// Mean period return scaled to a year.
pub fn annual_return(returns: &[f64], annualization: f64) -> f64 {
    mean_f64(returns) * annualization
}

/// Sample standard deviation of period returns scaled to a year.
pub fn annual_volatility(returns: &[f64], annualization: f64) -> f64 {
    std_dev(returns) * annualization.sqrt()
}

/// Annualized Sharpe ratio. 0 when volatility is 0.
pub fn sharpe_ratio(returns: &[f64], annualization: f64, risk_free_rate: f64) -> f64 {
    let vol = annual_volatility(returns, annualization);
    if vol <= 0.0 {
        return 0.0;
    }
    (annual_return(returns, annualization) - risk_free_rate) / vol
}

/// Annualized Sortino ratio.
///
/// Downside deviation is `sqrt(Σ min(r, 0)² / n)` over all `n` returns, so a
/// single losing period is enough to define it. 0 when no return is negative.
pub fn sortino_ratio(returns: &[f64], annualization: f64, risk_free_rate: f64) -> f64 {
    let downside_vol = downside_deviation(returns) * annualization.sqrt();
    if downside_vol <= 0.0 {
        return 0.0;
    }
    (annual_return(returns, annualization) - risk_free_rate) / downside_vol
}

/// Root mean square of the negative part of each return.
pub fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = returns.iter().map(|r| r.min(0.0).powi(2)).sum();
    (sum_sq / returns.len() as f64).sqrt()
}

/// Maximum drawdown as a positive fraction (0.25 = 25% decline from peak).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &value in equity_curve {
        peak = peak.max(value);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// Deepest drawdown with its dates and recovery.
///
/// `dates` must be parallel to `equity_curve`. A non-decreasing curve yields
/// the default (0, no dates).
pub fn drawdown_stats(equity_curve: &[f64], dates: &[NaiveDate]) -> DrawdownStats {
    let n = equity_curve.len().min(dates.len());
    let mut peak_idx = 0;
    let mut worst: Option<(usize, usize, f64)> = None;

    for i in 0..n {
        if equity_curve[i] > equity_curve[peak_idx] {
            peak_idx = i;
        }
        let peak = equity_curve[peak_idx];
        if peak <= 0.0 {
            continue;
        }
        let dd = (peak - equity_curve[i]) / peak;
        if dd > worst.map_or(0.0, |w| w.2) {
            worst = Some((peak_idx, i, dd));
        }
    }

    let Some((peak, trough, dd)) = worst else {
        return DrawdownStats::default();
    };

    let recovery = (trough + 1..n).find(|&j| equity_curve[j] > equity_curve[peak]);

    DrawdownStats {
        max_drawdown: dd,
        peak_date: Some(dates[peak]),
        trough_date: Some(dates[trough]),
        duration_bars: trough - peak,
        recovery_date: recovery.map(|j| dates[j]),
        recovery_bars: recovery.map(|j| j - trough),
    }
}

/// Fraction of closing fills with positive realized PnL.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let closing = trades.iter().filter(|t| t.is_closing()).count();
    if closing == 0 {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / closing as f64
}

/// Gross realized profit over gross realized loss.
///
/// Capped at `PROFIT_FACTOR_CAP` when nothing lost; 0 without closing fills.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let (gross_profit, gross_loss) = trades
        .iter()
        .filter_map(|t| t.realized_pnl)
        .fold((0.0, 0.0), |(profit, loss), pnl| {
            if pnl > 0.0 {
                (profit + pnl, loss)
            } else {
                (profit, loss - pnl)
            }
        });

    if gross_loss <= 0.0 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Period-over-period returns of a value series.
///
/// A non-positive base contributes a 0 return rather than an infinity.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1). 0 for fewer than two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}
