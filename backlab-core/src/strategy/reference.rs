//! Reference strategies.

use super::{BarContext, Strategy, Target};

/// Put the whole portfolio into one symbol and never trade again.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    pub symbol: String,
}

impl BuyAndHold {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        if ctx.holding(&self.symbol) > 0.0 {
            return None;
        }
        Some(vec![Target::weight(self.symbol.clone(), 1.0)])
    }
}

/// Equal weight across a universe, re-weighted on every rebalance.
///
/// An empty universe means every symbol in the feed.
#[derive(Debug, Clone, Default)]
pub struct EqualWeight {
    pub symbols: Vec<String>,
}

impl EqualWeight {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }
}

impl Strategy for EqualWeight {
    fn name(&self) -> &str {
        "equal_weight"
    }

    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        let universe: &[String] = if self.symbols.is_empty() {
            ctx.symbols()
        } else {
            &self.symbols
        };
        if universe.is_empty() {
            return None;
        }
        let weight = 1.0 / universe.len() as f64;
        Some(
            universe
                .iter()
                .map(|s| Target::weight(s.clone(), weight))
                .collect(),
        )
    }
}

/// Cross-sectional momentum: hold the `top_n` symbols with the best
/// trailing `lookback`-bar return, equally weighted.
///
/// Targets carry descending priority by rank, so a position limit below
/// `top_n` keeps the strongest names.
#[derive(Debug, Clone)]
pub struct Momentum {
    pub lookback: usize,
    pub top_n: usize,
}

impl Momentum {
    pub fn new(lookback: usize, top_n: usize) -> Self {
        Self { lookback, top_n }
    }

    /// Trailing return over the last `lookback` valid closes, if available.
    fn trailing_return(&self, ctx: &BarContext<'_>, symbol: &str) -> Option<f64> {
        ctx.close(symbol)?;
        let closes: Vec<f64> = ctx
            .history(symbol)?
            .iter()
            .filter_map(|b| b.close_price())
            .collect();
        if closes.len() <= self.lookback {
            return None;
        }
        let now = closes[closes.len() - 1];
        let then = closes[closes.len() - 1 - self.lookback];
        (then > 0.0).then(|| now / then - 1.0)
    }
}

impl Strategy for Momentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        if self.top_n == 0 || self.lookback == 0 {
            return None;
        }
        let mut ranked: Vec<(&String, f64)> = ctx
            .symbols()
            .iter()
            .filter_map(|s| self.trailing_return(ctx, s).map(|r| (s, r)))
            .collect();
        if ranked.is_empty() {
            return None;
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.top_n);

        let weight = 1.0 / ranked.len() as f64;
        let n = ranked.len() as i32;
        Some(
            ranked
                .into_iter()
                .enumerate()
                .map(|(rank, (symbol, _))| {
                    Target::weight(symbol.clone(), weight).with_priority(n - rank as i32)
                })
                .collect(),
        )
    }
}

/// The same target list on every rebalance.
#[derive(Debug, Clone, Default)]
pub struct FixedTargets {
    pub targets: Vec<Target>,
}

impl FixedTargets {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

impl Strategy for FixedTargets {
    fn name(&self) -> &str {
        "fixed_targets"
    }

    fn on_bar(&self, _ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        Some(self.targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AlignedFeed;
    use crate::data::align_symbols;
    use crate::domain::Bar;
    use crate::strategy::TargetAmount;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn series(symbol: &str, closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                symbol: symbol.into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1,
            })
            .collect()
    }

    fn three_symbol_feed() -> AlignedFeed {
        let mut map = HashMap::new();
        map.insert("AAA".to_string(), series("AAA", &[100.0, 101.0, 102.0, 103.0]));
        map.insert("BBB".to_string(), series("BBB", &[100.0, 105.0, 110.0, 120.0]));
        map.insert("CCC".to_string(), series("CCC", &[100.0, 99.0, 98.0, 97.0]));
        align_symbols(map)
    }

    #[test]
    fn buy_and_hold_only_buys_when_flat() {
        let feed = three_symbol_feed();
        let strategy = BuyAndHold::new("AAA");

        let flat = HashMap::new();
        let ctx = BarContext::new(&feed, 0, 0, &flat, 1_000.0, 1_000.0);
        let targets = strategy.on_bar(&ctx).unwrap();
        assert_eq!(targets, vec![Target::weight("AAA", 1.0)]);

        let mut held = HashMap::new();
        held.insert("AAA".to_string(), 9.0);
        let ctx = BarContext::new(&feed, 1, 1, &held, 1_000.0, 100.0);
        assert!(strategy.on_bar(&ctx).is_none());
    }

    #[test]
    fn equal_weight_defaults_to_whole_feed() {
        let feed = three_symbol_feed();
        let holdings = HashMap::new();
        let ctx = BarContext::new(&feed, 0, 0, &holdings, 1_000.0, 1_000.0);
        let targets = EqualWeight::default().on_bar(&ctx).unwrap();
        assert_eq!(targets.len(), 3);
        for t in &targets {
            assert!(matches!(t.amount, TargetAmount::Weight(w) if (w - 1.0 / 3.0).abs() < 1e-12));
        }
    }

    #[test]
    fn momentum_waits_for_lookback() {
        let feed = three_symbol_feed();
        let holdings = HashMap::new();
        let ctx = BarContext::new(&feed, 1, 1, &holdings, 1_000.0, 1_000.0);
        assert!(Momentum::new(2, 1).on_bar(&ctx).is_none());
    }

    #[test]
    fn momentum_ranks_by_trailing_return() {
        let feed = three_symbol_feed();
        let holdings = HashMap::new();
        let ctx = BarContext::new(&feed, 3, 3, &holdings, 1_000.0, 1_000.0);
        let targets = Momentum::new(3, 2).on_bar(&ctx).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].symbol, "BBB");
        assert_eq!(targets[1].symbol, "AAA");
        assert!(targets[0].priority > targets[1].priority);
    }
}
