use serde::{Deserialize, Serialize};

/// Open holding in one security.
///
/// `avg_cost` is the quantity-weighted blend of every increasing fill and is
/// left untouched by reducing fills. `last_price` is the most recent mark
/// (fill price on open, bar close afterwards).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub last_price: f64,
}

impl Position {
    pub fn open(symbol: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_cost: price,
            last_price: price,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_price
    }

    pub fn cost_value(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity * (self.last_price - self.avg_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_position_marks_at_fill_price() {
        let pos = Position::open("SPY", 10.0, 100.0);
        assert!(pos.is_long());
        assert_eq!(pos.market_value(), 1_000.0);
        assert_eq!(pos.unrealized_pnl(), 0.0);
    }

    #[test]
    fn unrealized_pnl_follows_mark() {
        let mut pos = Position::open("SPY", 10.0, 100.0);
        pos.last_price = 110.0;
        assert_eq!(pos.market_value(), 1_100.0);
        assert_eq!(pos.cost_value(), 1_000.0);
        assert_eq!(pos.unrealized_pnl(), 100.0);
    }
}
