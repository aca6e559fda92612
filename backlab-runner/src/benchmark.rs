//! Benchmark comparison — price series extraction and active-return stats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use backlab_core::PriceFeed;

use crate::metrics::{mean_f64, std_dev};

/// Active-return statistics of a strategy against a benchmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingStats {
    pub information_ratio: f64,
    pub tracking_error: f64,
}

/// Annualized tracking error and information ratio.
///
/// Excess return is strategy minus benchmark per period, over the common
/// prefix of both series. Both outputs are 0 when the tracking error is 0.
pub fn tracking_stats(
    strategy_returns: &[f64],
    benchmark_returns: &[f64],
    annualization: f64,
) -> TrackingStats {
    let excess: Vec<f64> = strategy_returns
        .iter()
        .zip(benchmark_returns)
        .map(|(s, b)| s - b)
        .collect();

    let tracking_error = std_dev(&excess) * annualization.sqrt();
    if tracking_error <= 0.0 {
        return TrackingStats::default();
    }
    TrackingStats {
        information_ratio: mean_f64(&excess) * annualization / tracking_error,
        tracking_error,
    }
}

/// Closing prices of `symbol` on each of `dates`.
///
/// Void bars carry the last valid close forward; a gap before the first valid
/// close takes that first close. Dates missing from the feed are treated like
/// void bars. `None` when the feed lacks the symbol or it never trades.
pub fn benchmark_series(
    feed: &dyn PriceFeed,
    symbol: &str,
    dates: &[NaiveDate],
) -> Option<Vec<f64>> {
    let bars = feed.bars(symbol)?;
    let feed_dates = feed.dates();
    let first_valid = bars.iter().find_map(|b| b.close_price())?;

    let mut last = first_valid;
    let series = dates
        .iter()
        .map(|date| {
            let close = feed_dates
                .binary_search(date)
                .ok()
                .and_then(|i| bars.get(i))
                .and_then(|b| b.close_price());
            if let Some(close) = close {
                last = close;
            }
            last
        })
        .collect();
    Some(series)
}
