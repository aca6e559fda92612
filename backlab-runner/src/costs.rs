//! Trading-cost summary — commission and slippage totals with a monthly breakdown.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use backlab_core::domain::TradeRecord;

use crate::metrics::mean_f64;

/// Costs incurred within one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCost {
    /// `YYYY-MM`
    pub period: String,
    pub commission: f64,
    pub slippage: f64,
    pub fills: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_commission: f64,
    pub total_slippage: f64,
    /// Total commission over the mean of the equity curve. 0 for an empty
    /// or non-positive curve.
    pub commission_to_avg_equity: f64,
    /// Chronological, one entry per month with at least one fill.
    pub by_month: Vec<PeriodCost>,
}

pub fn summarize_costs(trades: &[TradeRecord], equity_curve: &[f64]) -> CostSummary {
    let mut months: BTreeMap<(i32, u32), (f64, f64, usize)> = BTreeMap::new();
    for trade in trades {
        let entry = months
            .entry((trade.date.year(), trade.date.month()))
            .or_insert((0.0, 0.0, 0));
        entry.0 += trade.commission;
        entry.1 += trade.slippage;
        entry.2 += 1;
    }

    let total_commission: f64 = trades.iter().map(|t| t.commission).sum();
    let total_slippage: f64 = trades.iter().map(|t| t.slippage).sum();
    let avg_equity = mean_f64(equity_curve);

    CostSummary {
        total_commission,
        total_slippage,
        commission_to_avg_equity: if avg_equity > 0.0 {
            total_commission / avg_equity
        } else {
            0.0
        },
        by_month: months
            .into_iter()
            .map(|((year, month), (commission, slippage, fills))| PeriodCost {
                period: format!("{year:04}-{month:02}"),
                commission,
                slippage,
                fills,
            })
            .collect(),
    }
}
