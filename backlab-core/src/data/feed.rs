//! Price feed — the simulator's only view of market data.
//!
//! Given bars for multiple symbols, align them to a common timeline.
//! Missing bars become void bars (no forward-fill of tradable price data).

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Bar;

/// Structural problems with a feed, detected before a run starts.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed dates are not strictly increasing at index {index} ({date})")]
    UnorderedDates { index: usize, date: NaiveDate },
    #[error("symbol '{symbol}' has {actual} bars, expected {expected}")]
    Misaligned {
        symbol: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid volume {volume} for {symbol} on {date}")]
    InvalidVolume {
        symbol: String,
        date: NaiveDate,
        volume: f64,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Read access to a date-aligned, per-symbol bar history.
///
/// Every symbol's bar slice has the same length as `dates()`, and index `i`
/// of any slice refers to `dates()[i]`. Missing data is a void bar.
pub trait PriceFeed: Send + Sync {
    /// The common date axis, strictly increasing.
    fn dates(&self) -> &[NaiveDate];

    /// Symbols carried by the feed, in a stable order.
    fn symbols(&self) -> &[String];

    /// The full aligned bar history for a symbol.
    fn bars(&self, symbol: &str) -> Option<&[Bar]>;

    fn bar(&self, symbol: &str, index: usize) -> Option<&Bar> {
        self.bars(symbol).and_then(|bars| bars.get(index))
    }

    /// Closing price at `index`, or `None` if missing or void.
    fn close(&self, symbol: &str, index: usize) -> Option<f64> {
        self.bar(symbol, index).and_then(Bar::close_price)
    }

    fn len(&self) -> usize {
        self.dates().len()
    }

    fn is_empty(&self) -> bool {
        self.dates().is_empty()
    }

    /// Check the alignment contract.
    fn validate(&self) -> Result<(), FeedError> {
        let dates = self.dates();
        for (index, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(FeedError::UnorderedDates {
                    index: index + 1,
                    date: pair[1],
                });
            }
        }
        for symbol in self.symbols() {
            let actual = self.bars(symbol).map_or(0, <[Bar]>::len);
            if actual != dates.len() {
                return Err(FeedError::Misaligned {
                    symbol: symbol.clone(),
                    expected: dates.len(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// In-memory aligned bar data for multiple symbols on a common timeline.
#[derive(Debug, Clone, Default)]
pub struct AlignedFeed {
    /// The common date axis (sorted ascending).
    pub dates: Vec<NaiveDate>,
    /// Bars per symbol, each the same length as `dates`.
    pub bars: HashMap<String, Vec<Bar>>,
    /// Symbols included, sorted.
    pub symbols: Vec<String>,
}

impl AlignedFeed {
    /// Feed for a single symbol whose bars are already in date order.
    pub fn single(symbol: &str, bars: Vec<Bar>) -> Self {
        let mut map = HashMap::new();
        map.insert(symbol.to_string(), bars);
        align_symbols(map)
    }
}

impl PriceFeed for AlignedFeed {
    fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    fn symbols(&self) -> &[String] {
        &self.symbols
    }

    fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }
}

/// Align multiple symbols to a common timeline.
///
/// For each date in the union of all symbols' dates, each symbol either
/// has a real bar or gets a void bar. A repeated date keeps the last bar seen.
pub fn align_symbols(symbol_bars: HashMap<String, Vec<Bar>>) -> AlignedFeed {
    let mut all_dates = BTreeSet::new();
    for bars in symbol_bars.values() {
        for bar in bars {
            all_dates.insert(bar.date);
        }
    }
    let dates: Vec<NaiveDate> = all_dates.into_iter().collect();

    let mut symbols: Vec<String> = symbol_bars.keys().cloned().collect();
    symbols.sort();

    let mut aligned: HashMap<String, Vec<Bar>> = HashMap::with_capacity(symbol_bars.len());
    for (symbol, bars) in &symbol_bars {
        let by_date: HashMap<NaiveDate, &Bar> = bars.iter().map(|b| (b.date, b)).collect();
        let aligned_bars: Vec<Bar> = dates
            .iter()
            .map(|date| {
                by_date
                    .get(date)
                    .map(|b| (*b).clone())
                    .unwrap_or_else(|| Bar::void(symbol, *date))
            })
            .collect();
        aligned.insert(symbol.clone(), aligned_bars);
    }

    AlignedFeed {
        dates,
        bars: aligned,
        symbols,
    }
}
