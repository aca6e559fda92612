//! Deterministic synthetic price feeds.
//!
//! Each symbol gets a geometric random walk on weekdays. The per-symbol seed
//! is derived from the master seed and the symbol name via BLAKE3, so a
//! symbol's path does not depend on which other symbols are generated or in
//! what order.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::feed::{align_symbols, AlignedFeed};
use crate::domain::Bar;

/// Daily drift and volatility of the generated walk.
const DRIFT: f64 = 0.0003;
const VOLATILITY: f64 = 0.012;
const START_PRICE: f64 = 100.0;

/// Seed for one symbol's walk.
pub fn symbol_seed(master_seed: u64, symbol: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(symbol.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// The first `n` weekdays on or after `start`.
pub fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut date = start;
    while dates.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date += Duration::days(1);
    }
    dates
}

/// Random-walk bars for one symbol.
pub fn random_walk(symbol: &str, dates: &[NaiveDate], seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = START_PRICE;
    dates
        .iter()
        .map(|&date| {
            let open = close;
            let shock: f64 = rng.gen_range(-1.0..1.0) * VOLATILITY * 3f64.sqrt();
            close = (open * (1.0 + DRIFT + shock)).max(0.01);
            let wick: f64 = rng.gen_range(0.0..VOLATILITY);
            Bar {
                symbol: symbol.to_string(),
                date,
                open,
                high: open.max(close) * (1.0 + wick),
                low: open.min(close) * (1.0 - wick),
                close,
                volume: rng.gen_range(100_000..1_000_000),
            }
        })
        .collect()
}

/// Aligned synthetic feed of `n_bars` weekdays starting at `start`.
pub fn synthetic_feed(symbols: &[&str], start: NaiveDate, n_bars: usize, seed: u64) -> AlignedFeed {
    let dates = weekdays(start, n_bars);
    let map: HashMap<String, Vec<Bar>> = symbols
        .iter()
        .map(|s| (s.to_string(), random_walk(s, &dates, symbol_seed(seed, s))))
        .collect();
    align_symbols(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feed::PriceFeed;
    use crate::data::rules::{first_violation, sanity_rules};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn skips_weekends() {
        let dates = weekdays(start(), 10);
        assert_eq!(dates.len(), 10);
        assert!(dates
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn same_seed_same_feed() {
        let a = synthetic_feed(&["SPY", "QQQ"], start(), 50, 42);
        let b = synthetic_feed(&["QQQ", "SPY"], start(), 50, 42);
        assert_eq!(a.bars("SPY"), b.bars("SPY"));
        assert_eq!(a.bars("QQQ"), b.bars("QQQ"));
    }

    #[test]
    fn symbol_path_independent_of_universe() {
        let alone = synthetic_feed(&["SPY"], start(), 30, 7);
        let with_others = synthetic_feed(&["SPY", "IWM", "QQQ"], start(), 30, 7);
        assert_eq!(alone.bars("SPY"), with_others.bars("SPY"));
    }

    #[test]
    fn generated_bars_are_sane() {
        let feed = synthetic_feed(&["SPY"], start(), 200, 1);
        let rules = sanity_rules();
        for bar in feed.bars("SPY").unwrap() {
            assert!(first_violation(bar, &rules).is_none(), "bad bar {bar:?}");
        }
        assert!(feed.validate().is_ok());
    }
}
