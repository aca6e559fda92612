//! Orders produced by diffing strategy targets against ledger holdings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A market-on-close order for the current bar.
///
/// `quantity` is always positive; direction lives in `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl Order {
    pub fn buy(symbol: impl Into<String>, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            quantity,
        }
    }

    pub fn sell(symbol: impl Into<String>, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Sell,
            quantity,
        }
    }

    /// Quantity with the side's sign applied, as the ledger expects it.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_quantity_follows_side() {
        assert_eq!(Order::buy("SPY", 10.0).signed_quantity(), 10.0);
        assert_eq!(Order::sell("SPY", 10.0).signed_quantity(), -10.0);
    }
}
