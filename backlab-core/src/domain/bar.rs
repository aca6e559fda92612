//! Bar — the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol on a single date.
///
/// A bar whose OHLC fields are NaN is a *void* bar: the feed has no price for
/// the symbol on that date. Void bars are produced by multi-symbol alignment
/// and by ingest rules that reject a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// A void bar (all OHLC = NaN) for a date the symbol did not trade.
    pub fn void(symbol: &str, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            date,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close: f64::NAN,
            volume: 0,
        }
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    pub fn status(&self) -> MarketStatus {
        if self.is_void() {
            MarketStatus::Closed
        } else {
            MarketStatus::Open
        }
    }

    /// Closing price, or `None` for a void bar.
    pub fn close_price(&self) -> Option<f64> {
        (!self.is_void()).then_some(self.close)
    }
}

/// Whether the market is open or closed for a symbol on a given bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    Closed,
}
