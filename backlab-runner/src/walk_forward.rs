//! Walk-forward validation — rolling train/test windows and robustness scoring.
//!
//! The in-range bars of a run are split into rolling windows: window *k* trains
//! on `[k·step, k·step + train)` and tests on the `test` bars that follow.
//! Training is left to the strategy (it sees the train bars as history); only
//! the test range is simulated and analyzed. Windows run in parallel and are
//! aggregated after all of them finish.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use backlab_core::data::FeedError;
use backlab_core::{BacktestConfig, ConfigError, PriceFeed, Strategy};

use crate::metrics::{mean_f64, sample_variance};
use crate::runner::{run_backtest, RunError};

/// Score below which recommendations are emitted.
pub const ROBUSTNESS_THRESHOLD: f64 = 0.5;

/// Mean window drawdown at which drawdown discipline reaches 0.
pub const DRAWDOWN_TOLERANCE: f64 = 0.30;

const CONSISTENCY_WEIGHT: f64 = 0.6;
const DISCIPLINE_WEIGHT: f64 = 0.4;

/// Coefficient of variation above which returns are considered erratic.
const CV_LIMIT: f64 = 1.0;
const MIN_PROFITABLE_FRACTION: f64 = 0.5;
const DRAWDOWN_LIMIT: f64 = 0.20;

// ─── Configuration ───────────────────────────────────────────────────

/// Window geometry, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub train_period: usize,
    pub test_period: usize,
    pub step_size: usize,
}

impl Default for WalkForwardConfig {
    /// One trading year of training, one quarter of testing, quarterly step.
    fn default() -> Self {
        Self {
            train_period: 252,
            test_period: 63,
            step_size: 63,
        }
    }
}

impl WalkForwardConfig {
    pub fn new(train_period: usize, test_period: usize, step_size: usize) -> Self {
        Self {
            train_period,
            test_period,
            step_size,
        }
    }

    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_period == 0 {
            return Err(WalkForwardError::ZeroPeriod("train_period"));
        }
        if self.step_size == 0 {
            return Err(WalkForwardError::ZeroPeriod("step_size"));
        }
        // A test range needs distinct start and end dates.
        if self.test_period < 2 {
            return Err(WalkForwardError::TestPeriodTooShort(self.test_period));
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Bar index ranges of one window (half-open, into the in-range dates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Out-of-sample outcome of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub skipped_orders: usize,
    pub bar_count: usize,
}

/// Cross-window aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub window_count: usize,
    pub mean_return: f64,
    /// Sample variance of window total returns.
    pub return_variance: f64,
    /// `std / |mean|`; `None` when the mean return is exactly 0.
    pub coefficient_of_variation: Option<f64>,
    pub profitable_fraction: f64,
    pub mean_max_drawdown: f64,
    /// In `[0, 1]`; 0 for zero windows.
    pub robustness_score: f64,
    pub robust: bool,
}

/// Typed follow-up for a strategy that scored below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Window returns are too erratic relative to their mean.
    IncreaseRiskControls { coefficient_of_variation: Option<f64> },
    /// Too few windows made money.
    ImproveConsistency { profitable_fraction: f64 },
    /// Typical window drawdown is too deep.
    TightenDrawdownLimits { mean_max_drawdown: f64 },
    /// Below threshold with no single dominant cause.
    ReviewStrategy { robustness_score: f64 },
    /// The data range could not fit a single window.
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub config: WalkForwardConfig,
    pub strategy: String,
    pub windows: Vec<WindowResult>,
    pub summary: WalkForwardSummary,
    pub recommendations: Vec<Recommendation>,
}

/// Errors from walk-forward validation.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("walk-forward {0} must be at least 1")]
    ZeroPeriod(&'static str),
    #[error("walk-forward test_period must be at least 2 bars, got {0}")]
    TestPeriodTooShort(usize),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("backtest error in window {window}: {source}")]
    WindowFailed {
        window: usize,
        #[source]
        source: RunError,
    },
}

// ─── Window creation ─────────────────────────────────────────────────

/// Rolling windows over `total_bars`, stopping before a test range would run
/// past the data.
pub fn create_windows(total_bars: usize, config: &WalkForwardConfig) -> Vec<WindowSpec> {
    let span = config.train_period + config.test_period;
    if config.step_size == 0 || total_bars < span {
        return Vec::new();
    }

    (0..)
        .map(|k| k * config.step_size)
        .take_while(|offset| offset + span <= total_bars)
        .enumerate()
        .map(|(index, offset)| WindowSpec {
            index,
            train_start: offset,
            train_end: offset + config.train_period,
            test_start: offset + config.train_period,
            test_end: offset + span,
        })
        .collect()
}

// ─── Walk-forward orchestration ──────────────────────────────────────

/// Run walk-forward validation of one strategy over the date range of `base`.
///
/// Each window reuses `base` with its dates narrowed to the test range. Zero
/// windows is a valid result with score 0.
pub fn run_walk_forward(
    base: &BacktestConfig,
    wf_config: &WalkForwardConfig,
    feed: &dyn PriceFeed,
    strategy: &dyn Strategy,
) -> Result<WalkForwardResult, WalkForwardError> {
    wf_config.validate()?;
    base.validate()?;
    feed.validate()?;

    let dates: Vec<NaiveDate> = feed
        .dates()
        .iter()
        .copied()
        .filter(|d| base.contains(*d))
        .collect();
    let specs = create_windows(dates.len(), wf_config);

    let windows = specs
        .par_iter()
        .map(|spec| -> Result<WindowResult, WalkForwardError> {
            let mut config = base.clone();
            config.start_date = dates[spec.test_start];
            config.end_date = dates[spec.test_end - 1];

            let result = run_backtest(&config, feed, strategy).map_err(|source| {
                WalkForwardError::WindowFailed {
                    window: spec.index,
                    source,
                }
            })?;

            Ok(WindowResult {
                index: spec.index,
                train_start: dates[spec.train_start],
                train_end: dates[spec.train_end - 1],
                test_start: config.start_date,
                test_end: config.end_date,
                total_return: result.metrics.total_return,
                sharpe: result.metrics.sharpe,
                max_drawdown: result.metrics.max_drawdown,
                trade_count: result.metrics.trade_count,
                skipped_orders: result.run_log.len(),
                bar_count: result.bar_count,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let summary = aggregate_windows(&windows);
    let recommendations = recommend(&summary);

    info!(
        strategy = strategy.name(),
        windows = summary.window_count,
        score = summary.robustness_score,
        robust = summary.robust,
        "walk-forward complete"
    );

    Ok(WalkForwardResult {
        config: *wf_config,
        strategy: strategy.name().to_string(),
        windows,
        summary,
        recommendations,
    })
}

// ─── Aggregation ─────────────────────────────────────────────────────

/// Aggregate window results into summary statistics and a robustness score.
pub fn aggregate_windows(windows: &[WindowResult]) -> WalkForwardSummary {
    let returns: Vec<f64> = windows.iter().map(|w| w.total_return).collect();
    let drawdowns: Vec<f64> = windows.iter().map(|w| w.max_drawdown).collect();

    let mean_return = mean_f64(&returns);
    let return_variance = sample_variance(&returns);
    let std = return_variance.sqrt();
    let coefficient_of_variation = if mean_return == 0.0 {
        None
    } else {
        Some(std / mean_return.abs())
    };

    let profitable_fraction = if windows.is_empty() {
        0.0
    } else {
        returns.iter().filter(|r| **r > 0.0).count() as f64 / windows.len() as f64
    };
    let mean_max_drawdown = mean_f64(&drawdowns);

    let robustness_score = if windows.is_empty() {
        0.0
    } else {
        robustness_score(profitable_fraction, coefficient_of_variation, std, mean_max_drawdown)
    };

    WalkForwardSummary {
        window_count: windows.len(),
        mean_return,
        return_variance,
        coefficient_of_variation,
        profitable_fraction,
        mean_max_drawdown,
        robustness_score,
        robust: robustness_score >= ROBUSTNESS_THRESHOLD,
    }
}

/// Weighted blend of return consistency and drawdown discipline, in `[0, 1]`.
///
/// Consistency is the profitable fraction dampened by `1 / (1 + CV)`. An
/// undefined CV dampens to 0 when returns disperse around a zero mean.
fn robustness_score(
    profitable_fraction: f64,
    coefficient_of_variation: Option<f64>,
    std: f64,
    mean_max_drawdown: f64,
) -> f64 {
    let dampening = match coefficient_of_variation {
        Some(cv) => 1.0 / (1.0 + cv),
        None if std > 0.0 => 0.0,
        None => 1.0,
    };
    let consistency = profitable_fraction * dampening;
    let discipline = (1.0 - mean_max_drawdown / DRAWDOWN_TOLERANCE).clamp(0.0, 1.0);
    (CONSISTENCY_WEIGHT * consistency + DISCIPLINE_WEIGHT * discipline).clamp(0.0, 1.0)
}

/// Recommendations for a summary below `ROBUSTNESS_THRESHOLD`; empty otherwise.
pub fn recommend(summary: &WalkForwardSummary) -> Vec<Recommendation> {
    if summary.robust {
        return Vec::new();
    }
    if summary.window_count == 0 {
        return vec![Recommendation::InsufficientData];
    }

    let mut out = Vec::new();
    let erratic = match summary.coefficient_of_variation {
        Some(cv) => cv > CV_LIMIT,
        None => summary.return_variance > 0.0,
    };
    if erratic {
        out.push(Recommendation::IncreaseRiskControls {
            coefficient_of_variation: summary.coefficient_of_variation,
        });
    }
    if summary.profitable_fraction < MIN_PROFITABLE_FRACTION {
        out.push(Recommendation::ImproveConsistency {
            profitable_fraction: summary.profitable_fraction,
        });
    }
    if summary.mean_max_drawdown > DRAWDOWN_LIMIT {
        out.push(Recommendation::TightenDrawdownLimits {
            mean_max_drawdown: summary.mean_max_drawdown,
        });
    }
    if out.is_empty() {
        out.push(Recommendation::ReviewStrategy {
            robustness_score: summary.robustness_score,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(index: usize, total_return: f64, max_drawdown: f64) -> WindowResult {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        WindowResult {
            index,
            train_start: d,
            train_end: d,
            test_start: d,
            test_end: d,
            total_return,
            sharpe: 0.0,
            max_drawdown,
            trade_count: 0,
            skipped_orders: 0,
            bar_count: 63,
        }
    }

    // ─── Window creation tests ───────────────────────────────────

    #[test]
    fn window_counts_at_boundaries() {
        let config = WalkForwardConfig::default();
        assert_eq!(create_windows(314, &config).len(), 0);
        assert_eq!(create_windows(315, &config).len(), 1);
        assert_eq!(create_windows(377, &config).len(), 1);
        assert_eq!(create_windows(378, &config).len(), 2);
    }

    #[test]
    fn windows_roll_by_step() {
        let config = WalkForwardConfig::new(10, 5, 3);
        let windows = create_windows(30, &config);
        // offsets 0, 3, ..., 15 (15 + 15 = 30)
        assert_eq!(windows.len(), 6);
        for (k, w) in windows.iter().enumerate() {
            assert_eq!(w.index, k);
            assert_eq!(w.train_start, 3 * k);
            assert_eq!(w.train_end - w.train_start, 10);
            assert_eq!(w.test_start, w.train_end);
            assert_eq!(w.test_end - w.test_start, 5);
            assert!(w.test_end <= 30);
        }
    }

    #[test]
    fn config_validation() {
        assert!(WalkForwardConfig::default().validate().is_ok());
        assert!(matches!(
            WalkForwardConfig::new(0, 5, 1).validate(),
            Err(WalkForwardError::ZeroPeriod("train_period"))
        ));
        assert!(matches!(
            WalkForwardConfig::new(5, 5, 0).validate(),
            Err(WalkForwardError::ZeroPeriod("step_size"))
        ));
        assert!(matches!(
            WalkForwardConfig::new(5, 1, 1).validate(),
            Err(WalkForwardError::TestPeriodTooShort(1))
        ));
    }

    #[test]
    fn config_from_toml_with_defaults() {
        let config: WalkForwardConfig = toml::from_str("test_period = 21").unwrap();
        assert_eq!(config, WalkForwardConfig::new(252, 21, 63));
    }

    // ─── Aggregation tests ───────────────────────────────────────

    #[test]
    fn zero_windows_scores_zero() {
        let summary = aggregate_windows(&[]);
        assert_eq!(summary.window_count, 0);
        assert_eq!(summary.robustness_score, 0.0);
        assert!(!summary.robust);
        assert_eq!(summary.coefficient_of_variation, None);
        assert_eq!(recommend(&summary), vec![Recommendation::InsufficientData]);
    }

    #[test]
    fn consistent_windows_are_robust() {
        let windows = vec![window(0, 0.05, 0.03), window(1, 0.05, 0.03), window(2, 0.05, 0.03)];
        let summary = aggregate_windows(&windows);
        assert_eq!(summary.profitable_fraction, 1.0);
        assert!(summary.return_variance < 1e-15);
        // consistency 1.0, discipline 0.9 → 0.6 + 0.36
        assert!((summary.robustness_score - 0.96).abs() < 1e-9);
        assert!(summary.robust);
        assert!(recommend(&summary).is_empty());
    }

    #[test]
    fn mean_and_sample_variance() {
        let windows = vec![window(0, 0.1, 0.0), window(1, -0.1, 0.0), window(2, 0.3, 0.0)];
        let summary = aggregate_windows(&windows);
        assert!((summary.mean_return - 0.1).abs() < 1e-12);
        assert!((summary.return_variance - 0.04).abs() < 1e-12);
        assert!((summary.coefficient_of_variation.unwrap() - 2.0).abs() < 1e-9);
        assert!((summary.profitable_fraction - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn erratic_windows_need_risk_controls() {
        let windows = vec![window(0, 0.2, 0.25), window(1, -0.15, 0.28), window(2, -0.02, 0.22)];
        let summary = aggregate_windows(&windows);
        assert!(summary.coefficient_of_variation.unwrap() > 1.0);
        assert!(!summary.robust);

        let recs = recommend(&summary);
        assert!(recs
            .iter()
            .any(|r| matches!(r, Recommendation::IncreaseRiskControls { .. })));
        assert!(recs
            .iter()
            .any(|r| matches!(r, Recommendation::ImproveConsistency { .. })));
        assert!(recs
            .iter()
            .any(|r| matches!(r, Recommendation::TightenDrawdownLimits { .. })));
    }

    #[test]
    fn zero_mean_with_dispersion_has_no_cv() {
        let windows = vec![window(0, 0.1, 0.1), window(1, -0.1, 0.1)];
        let summary = aggregate_windows(&windows);
        assert_eq!(summary.coefficient_of_variation, None);
        // consistency 0, discipline 2/3
        assert!((summary.robustness_score - 0.4 * (2.0 / 3.0)).abs() < 1e-9);
        assert!(recommend(&summary)
            .iter()
            .any(|r| matches!(r, Recommendation::IncreaseRiskControls { coefficient_of_variation: None })));
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let deep = vec![window(0, -0.5, 0.9), window(1, -0.4, 0.8)];
        let summary = aggregate_windows(&deep);
        assert!((0.0..=1.0).contains(&summary.robustness_score));
        assert_eq!(summary.robustness_score, 0.0);
    }

    #[test]
    fn below_threshold_without_dominant_cause_asks_for_review() {
        // Profitable but deep-ish drawdowns: consistency 1/(1+cv), discipline low
        let summary = WalkForwardSummary {
            window_count: 4,
            mean_return: 0.01,
            return_variance: 0.0001,
            coefficient_of_variation: Some(1.0),
            profitable_fraction: 0.5,
            mean_max_drawdown: 0.19,
            robustness_score: 0.3,
            robust: false,
        };
        assert_eq!(
            recommend(&summary),
            vec![Recommendation::ReviewStrategy { robustness_score: 0.3 }]
        );
    }
}
