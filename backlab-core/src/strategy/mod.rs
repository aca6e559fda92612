//! Strategy interface — the simulator's only caller-supplied decision logic.
//!
//! On each rebalance bar the simulator hands the strategy a [`BarContext`]
//! and receives either `None` (hold everything as is) or a complete target
//! portfolio. Held symbols absent from the returned list are targeted to zero.
//!
//! # Architecture invariant
//! A strategy sees bars up to and including the current one, never later.
//! `BarContext` slices the feed at the current index, so look-ahead is not
//! expressible through it.

pub mod factory;
pub mod reference;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::PriceFeed;
use crate::domain::Bar;

pub use factory::{StrategyConfig, StrategyConfigError};
pub use reference::{BuyAndHold, EqualWeight, FixedTargets, Momentum};

/// How much of a symbol the strategy wants to hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAmount {
    /// Absolute share count.
    Quantity(f64),
    /// Fraction of current total portfolio value.
    Weight(f64),
}

/// Desired holding for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub symbol: String,
    pub amount: TargetAmount,
    /// Higher priority targets survive position-limit truncation first.
    #[serde(default)]
    pub priority: i32,
}

impl Target {
    pub fn quantity(symbol: impl Into<String>, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            amount: TargetAmount::Quantity(quantity),
            priority: 0,
        }
    }

    pub fn weight(symbol: impl Into<String>, weight: f64) -> Self {
        Self {
            symbol: symbol.into(),
            amount: TargetAmount::Weight(weight),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A flat target (zero quantity or zero weight).
    pub fn is_zero(&self) -> bool {
        match self.amount {
            TargetAmount::Quantity(q) => q == 0.0,
            TargetAmount::Weight(w) => w == 0.0,
        }
    }
}

/// Read-only view of the market and the portfolio at one bar.
pub struct BarContext<'a> {
    /// Date of the current bar.
    pub date: NaiveDate,
    /// Zero-based index of the bar within the run.
    pub bar_index: usize,
    /// Portfolio value marked at the current bar's closes.
    pub total_value: f64,
    pub cash: f64,
    feed_index: usize,
    feed: &'a dyn PriceFeed,
    holdings: &'a HashMap<String, f64>,
}

impl<'a> BarContext<'a> {
    pub fn new(
        feed: &'a dyn PriceFeed,
        feed_index: usize,
        bar_index: usize,
        holdings: &'a HashMap<String, f64>,
        total_value: f64,
        cash: f64,
    ) -> Self {
        let date = feed.dates()[feed_index];
        Self {
            date,
            bar_index,
            total_value,
            cash,
            feed_index,
            feed,
            holdings,
        }
    }

    /// Symbols available in the feed.
    pub fn symbols(&self) -> &'a [String] {
        self.feed.symbols()
    }

    /// Bars for `symbol` from the start of the feed through the current bar.
    ///
    /// Includes bars before the run's start date, which are history the
    /// strategy may legitimately look back on.
    pub fn history(&self, symbol: &str) -> Option<&'a [Bar]> {
        self.feed
            .bars(symbol)
            .and_then(|bars| bars.get(..=self.feed_index))
    }

    /// The current bar for `symbol`.
    pub fn bar(&self, symbol: &str) -> Option<&'a Bar> {
        self.feed.bar(symbol, self.feed_index)
    }

    /// The current close, or `None` when the symbol does not trade today.
    pub fn close(&self, symbol: &str) -> Option<f64> {
        self.feed.close(symbol, self.feed_index)
    }

    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.close(symbol).is_some()
    }

    /// Held quantity (0.0 when flat).
    pub fn holding(&self, symbol: &str) -> f64 {
        self.holdings.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn holdings(&self) -> &'a HashMap<String, f64> {
        self.holdings
    }
}

/// Caller-supplied decision logic.
pub trait Strategy: Send + Sync {
    /// Human-readable name (e.g., "momentum").
    fn name(&self) -> &str;

    /// Decide the target portfolio for the current bar.
    ///
    /// `None` keeps current holdings untouched. `Some(targets)` is the full
    /// desired portfolio; held symbols missing from it are sold.
    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>>;
}
