//! Ledger — cash plus open positions, mutated only by fills.
//!
//! Handles position creation, averaging in, reduction and closure, realized
//! PnL and cash accounting. Every mutation is all-or-nothing: a rejected fill
//! leaves cash and positions exactly as they were.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::position::Position;

/// Slack allowed when comparing a buy's cost against available cash, so a
/// cost-inclusive full allocation is not rejected by float rounding.
pub const CASH_TOLERANCE: f64 = 1e-6;

/// Quantities at or below this magnitude are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Reasons a fill is rejected by the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient cash for {symbol}: need {required:.2}, have {available:.2}")]
    InsufficientCash {
        symbol: String,
        required: f64,
        available: f64,
    },
    #[error("oversell of {symbol}: requested {requested}, held {held}")]
    OverSell {
        symbol: String,
        requested: f64,
        held: f64,
    },
    #[error("invalid fill for {symbol}: quantity={quantity}, price={price}, commission={commission}")]
    InvalidFill {
        symbol: String,
        quantity: f64,
        price: f64,
        commission: f64,
    },
}

/// What a successful fill did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOutcome {
    /// Realized PnL net of commission; `None` for increasing fills.
    pub realized_pnl: Option<f64>,
    /// True when the fill closed the position entirely.
    pub closed: bool,
}

/// Aggregate account state.
///
/// After every call to [`Ledger::apply_fill`] and [`Ledger::mark_to_market`],
/// `cash + Σ quantity × last_price` equals
/// `initial_capital + realized − commission + Σ quantity × (last_price − avg_cost)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    cash: f64,
    initial_capital: f64,
    positions: HashMap<String, Position>,
    total_commission: f64,
    /// Realized PnL before commission, summed over every reducing fill.
    #[serde(default)]
    realized_gross: f64,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            total_commission: 0.0,
            realized_gross: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Realized PnL over all closed quantity, before commission.
    pub fn realized_gross(&self) -> f64 {
        self.realized_gross
    }

    /// Mark-to-market gain of open positions over their average cost.
    pub fn unrealized_pnl(&self) -> f64 {
        self.positions
            .values()
            .map(|p| p.quantity * (p.last_price - p.avg_cost))
            .sum()
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Held quantity for a symbol (0.0 when flat).
    pub fn quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.quantity)
    }

    /// Held quantities keyed by symbol.
    pub fn holdings(&self) -> HashMap<String, f64> {
        self.positions
            .iter()
            .map(|(sym, pos)| (sym.clone(), pos.quantity))
            .collect()
    }

    /// Sum of position market values at their last marks.
    pub fn position_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Total value = cash + sum of position market values.
    pub fn total_value(&self) -> f64 {
        self.cash + self.position_value()
    }

    /// Apply one fill atomically.
    ///
    /// Positive `signed_quantity` buys, negative sells. `commission` is charged
    /// in the same update as the notional.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        signed_quantity: f64,
        price: f64,
        commission: f64,
    ) -> Result<FillOutcome, LedgerError> {
        let valid = signed_quantity.is_finite()
            && signed_quantity.abs() > QUANTITY_EPSILON
            && price.is_finite()
            && price > 0.0
            && commission.is_finite()
            && commission >= 0.0;
        if !valid {
            return Err(LedgerError::InvalidFill {
                symbol: symbol.to_string(),
                quantity: signed_quantity,
                price,
                commission,
            });
        }

        if signed_quantity > 0.0 {
            self.apply_buy(symbol, signed_quantity, price, commission)
        } else {
            self.apply_sell(symbol, -signed_quantity, price, commission)
        }
    }

    /// Mark a held position to a new price. Returns false if nothing is held.
    pub fn mark_to_market(&mut self, symbol: &str, price: f64) -> bool {
        match self.positions.get_mut(symbol) {
            Some(pos) if price.is_finite() => {
                pos.last_price = price;
                true
            }
            _ => false,
        }
    }

    /// Verify the accounting identity and return the total value.
    ///
    /// Reconciles the marked value against capital plus PnL less costs, which
    /// is tracked separately from cash. Panics in debug builds on a mismatch.
    pub fn verify_identity(&self) -> f64 {
        let total = self.total_value();

        #[cfg(debug_assertions)]
        {
            let expected = self.initial_capital + self.realized_gross - self.total_commission
                + self.unrealized_pnl();
            assert!(
                (total - expected).abs() <= 1e-6 * expected.abs().max(1.0),
                "ledger identity violated: total={total}, capital + pnl - costs = {expected}"
            );
        }

        total
    }

    fn apply_buy(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        commission: f64,
    ) -> Result<FillOutcome, LedgerError> {
        let notional = quantity * price;
        let required = notional + commission;
        if required > self.cash + CASH_TOLERANCE {
            return Err(LedgerError::InsufficientCash {
                symbol: symbol.to_string(),
                required,
                available: self.cash,
            });
        }

        self.cash -= required;
        self.total_commission += commission;

        match self.positions.get_mut(symbol) {
            Some(pos) => {
                // Averaging in
                let new_quantity = pos.quantity + quantity;
                pos.avg_cost = (pos.cost_value() + notional) / new_quantity;
                pos.quantity = new_quantity;
            }
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::open(symbol, quantity, price));
            }
        }

        Ok(FillOutcome {
            realized_pnl: None,
            closed: false,
        })
    }

    fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        commission: f64,
    ) -> Result<FillOutcome, LedgerError> {
        let held = self.quantity(symbol);
        if quantity > held + QUANTITY_EPSILON {
            return Err(LedgerError::OverSell {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        }
        // Guarded above: a position exists whenever held > 0.
        let Some(pos) = self.positions.get_mut(symbol) else {
            return Err(LedgerError::OverSell {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        };

        let sold = quantity.min(pos.quantity);
        let gross = (price - pos.avg_cost) * sold;
        pos.quantity -= sold;
        self.realized_gross += gross;

        self.cash += sold * price - commission;
        self.total_commission += commission;

        let closed = pos.quantity <= QUANTITY_EPSILON;
        if closed {
            self.positions.remove(symbol);
        }

        Ok(FillOutcome {
            realized_pnl: Some(gross - commission),
            closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ledger_is_all_cash() {
        let ledger = Ledger::new(100_000.0);
        assert_eq!(ledger.cash(), 100_000.0);
        assert_eq!(ledger.total_value(), 100_000.0);
        assert!(ledger.positions().is_empty());
    }

    #[test]
    fn buy_deducts_notional_and_commission() {
        let mut ledger = Ledger::new(20_000.0);
        let outcome = ledger.apply_fill("SPY", 100.0, 100.0, 10.0).unwrap();
        assert_eq!(outcome.realized_pnl, None);
        assert!((ledger.cash() - (20_000.0 - 10_010.0)).abs() < 1e-9);
        assert_eq!(ledger.quantity("SPY"), 100.0);
        assert_eq!(ledger.total_commission(), 10.0);
    }

    #[test]
    fn averaging_in_blends_cost() {
        let mut ledger = Ledger::new(100_000.0);
        ledger.apply_fill("SPY", 100.0, 100.0, 0.0).unwrap();
        ledger.apply_fill("SPY", 100.0, 110.0, 0.0).unwrap();
        let pos = ledger.position("SPY").unwrap();
        assert_eq!(pos.quantity, 200.0);
        assert!((pos.avg_cost - 105.0).abs() < 1e-10);
    }

    #[test]
    fn reducing_fill_keeps_avg_cost_and_realizes_pnl() {
        let mut ledger = Ledger::new(100_000.0);
        ledger.apply_fill("SPY", 100.0, 100.0, 0.0).unwrap();
        let outcome = ledger.apply_fill("SPY", -40.0, 120.0, 2.0).unwrap();
        // (120 - 100) * 40 - 2
        assert!((outcome.realized_pnl.unwrap() - 798.0).abs() < 1e-10);
        assert!(!outcome.closed);
        let pos = ledger.position("SPY").unwrap();
        assert_eq!(pos.quantity, 60.0);
        assert_eq!(pos.avg_cost, 100.0);
    }

    #[test]
    fn closing_fill_removes_position() {
        let mut ledger = Ledger::new(100_000.0);
        ledger.apply_fill("SPY", 50.0, 100.0, 0.0).unwrap();
        let outcome = ledger.apply_fill("SPY", -50.0, 90.0, 0.0).unwrap();
        assert!(outcome.closed);
        assert!(ledger.position("SPY").is_none());
        assert!((ledger.cash() - 99_500.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_cash_leaves_ledger_untouched() {
        let mut ledger = Ledger::new(1_000.0);
        let err = ledger.apply_fill("SPY", 100.0, 100.0, 0.0).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCash { .. }));
        assert_eq!(ledger.cash(), 1_000.0);
        assert!(ledger.positions().is_empty());
        assert_eq!(ledger.total_commission(), 0.0);
    }

    #[test]
    fn commission_can_tip_buy_into_rejection() {
        let mut ledger = Ledger::new(10_000.0);
        let err = ledger.apply_fill("SPY", 100.0, 100.0, 10.0).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCash { .. }));
    }

    #[test]
    fn oversell_is_rejected() {
        let mut ledger = Ledger::new(100_000.0);
        ledger.apply_fill("SPY", 10.0, 100.0, 0.0).unwrap();
        let err = ledger.apply_fill("SPY", -11.0, 100.0, 0.0).unwrap_err();
        assert!(matches!(err, LedgerError::OverSell { held, .. } if held == 10.0));
        assert_eq!(ledger.quantity("SPY"), 10.0);
    }

    #[test]
    fn selling_unheld_symbol_is_oversell() {
        let mut ledger = Ledger::new(100_000.0);
        let err = ledger.apply_fill("QQQ", -1.0, 100.0, 0.0).unwrap_err();
        assert!(matches!(err, LedgerError::OverSell { held, .. } if held == 0.0));
    }

    #[test]
    fn invalid_fills_are_rejected() {
        let mut ledger = Ledger::new(100_000.0);
        assert!(ledger.apply_fill("SPY", 0.0, 100.0, 0.0).is_err());
        assert!(ledger.apply_fill("SPY", 1.0, f64::NAN, 0.0).is_err());
        assert!(ledger.apply_fill("SPY", 1.0, 100.0, -1.0).is_err());
        assert_eq!(ledger.cash(), 100_000.0);
    }

    #[test]
    fn mark_to_market_moves_total_value() {
        let mut ledger = Ledger::new(100_000.0);
        ledger.apply_fill("SPY", 100.0, 100.0, 0.0).unwrap();
        assert!(ledger.mark_to_market("SPY", 110.0));
        assert!(!ledger.mark_to_market("QQQ", 50.0));
        // 90_000 cash + 100 * 110
        assert!((ledger.total_value() - 101_000.0).abs() < 1e-9);
        assert!((ledger.verify_identity() - 101_000.0).abs() < 1e-9);
    }

    #[test]
    fn identity_reconciles_capital_pnl_and_costs() {
        let mut ledger = Ledger::new(50_000.0);
        ledger.apply_fill("SPY", 100.0, 100.0, 10.0).unwrap();
        ledger.apply_fill("QQQ", 50.0, 200.0, 10.0).unwrap();
        ledger.apply_fill("SPY", -40.0, 120.0, 4.8).unwrap();
        ledger.mark_to_market("SPY", 90.0);
        ledger.mark_to_market("QQQ", 210.0);

        assert!((ledger.realized_gross() - 800.0).abs() < 1e-9);
        // 60 * (90 - 100) + 50 * (210 - 200)
        assert!((ledger.unrealized_pnl() - (-100.0)).abs() < 1e-9);
        let expected = 50_000.0 + 800.0 - 24.8 - 100.0;
        assert!((ledger.verify_identity() - expected).abs() < 1e-6);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "ledger identity violated")]
    fn cash_drift_trips_identity_check() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply_fill("SPY", 10.0, 100.0, 1.0).unwrap();
        ledger.cash += 5.0;
        ledger.verify_identity();
    }
}
