//! Cost model — slippage and commission calculation.
//!
//! Slippage is directional: buyers pay more (higher price), sellers receive
//! less (lower price). Commission is a flat fraction of fill notional.

use crate::config::BacktestConfig;
use crate::domain::OrderSide;

/// Execution friction applied to every fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Adverse price adjustment as a fraction of the bar price.
    pub slippage_rate: f64,
    /// Commission as a fraction of fill notional.
    pub commission_rate: f64,
}

impl CostModel {
    pub fn new(slippage_rate: f64, commission_rate: f64) -> Self {
        Self {
            slippage_rate,
            commission_rate,
        }
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.slippage_rate, config.commission_rate)
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Apply slippage to a raw fill price.
    ///
    /// Returns `(slipped_price, slippage_dollar_amount)`.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide, quantity: f64) -> (f64, f64) {
        if self.slippage_rate == 0.0 {
            return (raw_price, 0.0);
        }
        let slipped = raw_price * (1.0 + side.sign() * self.slippage_rate);
        let amount = (slipped - raw_price).abs() * quantity;
        (slipped, amount)
    }

    /// `commission = fill_price * quantity * commission_rate`
    pub fn compute_commission(&self, fill_price: f64, quantity: f64) -> f64 {
        fill_price * quantity * self.commission_rate
    }

    /// Cash consumed per share bought at `raw_price`, slippage and commission included.
    pub fn buy_cost_per_share(&self, raw_price: f64) -> f64 {
        raw_price * (1.0 + self.slippage_rate) * (1.0 + self.commission_rate)
    }

    /// Cash received per share sold at `raw_price`, net of slippage and commission.
    pub fn sell_proceeds_per_share(&self, raw_price: f64) -> f64 {
        raw_price * (1.0 - self.slippage_rate) * (1.0 - self.commission_rate)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::frictionless()
    }
}
