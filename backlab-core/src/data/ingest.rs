//! CSV price ingest.
//!
//! Reads long-format rows (`date,symbol,open,high,low,close,volume`), groups
//! them by symbol, voids rows that fail the bar rules, and aligns everything
//! onto a common date axis.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use super::feed::{align_symbols, AlignedFeed, FeedError, PriceFeed};
use super::rules::{apply_rules, BarRule, RuleViolation};
use crate::domain::Bar;

/// One row of the price file.
#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    /// Vendors often write volume as a float (`1200.0`); it is rounded to whole units.
    #[serde(default)]
    volume: f64,
}

impl TryFrom<PriceRow> for Bar {
    type Error = FeedError;

    fn try_from(row: PriceRow) -> Result<Self, FeedError> {
        if !(row.volume.is_finite() && row.volume >= 0.0) {
            return Err(FeedError::InvalidVolume {
                symbol: row.symbol,
                date: row.date,
                volume: row.volume,
            });
        }
        Ok(Bar {
            symbol: row.symbol,
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.round() as u64,
        })
    }
}

/// Result of ingesting a price file.
#[derive(Debug)]
pub struct IngestReport {
    pub feed: AlignedFeed,
    pub rows: usize,
    /// Rows voided because they failed a rule.
    pub violations: Vec<RuleViolation>,
}

/// Read prices from any CSV source.
///
/// Rows may arrive in any order; each symbol's bars are sorted by date before
/// alignment. Rows failing `rules` are kept as void bars, so the date still
/// appears on the axis but the security is untradable that day.
pub fn load_csv_reader<R: Read>(reader: R, rules: &[BarRule]) -> Result<IngestReport, FeedError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut by_symbol: HashMap<String, Vec<Bar>> = HashMap::new();
    let mut rows = 0usize;
    for record in csv_reader.deserialize::<PriceRow>() {
        let bar = Bar::try_from(record?)?;
        by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        rows += 1;
    }

    let mut violations = Vec::new();
    for bars in by_symbol.values_mut() {
        bars.sort_by_key(|b| b.date);
        violations.extend(apply_rules(bars, rules));
    }

    let feed = align_symbols(by_symbol);
    feed.validate()?;
    info!(
        rows,
        symbols = feed.symbols().len(),
        dates = feed.len(),
        voided = violations.len(),
        "loaded price data"
    );
    Ok(IngestReport {
        feed,
        rows,
        violations,
    })
}

/// Read prices from a CSV file on disk.
pub fn load_csv_path(path: &Path, rules: &[BarRule]) -> Result<IngestReport, FeedError> {
    debug!(path = %path.display(), "opening price file");
    let file = File::open(path).map_err(csv::Error::from)?;
    load_csv_reader(file, rules)
}
