//! TradeRecord — one immutable fill in the trade log.

use super::order::OrderSide;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single executed fill.
///
/// Created by the simulator after the ledger accepted the fill; never mutated.
/// `realized_pnl` is set only on reducing (sell) fills and is net of that
/// fill's commission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub date: NaiveDate,
    pub bar_index: usize,
    pub symbol: String,
    pub side: OrderSide,

    // ── Execution ──
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    /// Cost of slippage versus the raw bar price, in currency.
    pub slippage: f64,

    // ── PnL ──
    pub realized_pnl: Option<f64>,
}

impl TradeRecord {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    /// True for closing/reducing fills.
    pub fn is_closing(&self) -> bool {
        self.realized_pnl.is_some()
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > 0.0)
    }
}
