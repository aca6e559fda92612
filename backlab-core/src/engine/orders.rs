//! Target-to-order conversion.
//!
//! Turns a strategy's target portfolio into a sequenced order list:
//! 1. Truncate non-zero targets to the position limit
//! 2. Resolve weights into whole-share quantities
//! 3. Diff against holdings
//! 4. Sells first, then buys, each group by symbol ascending

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::ledger::QUANTITY_EPSILON;
use crate::domain::Order;
use crate::strategy::{Target, TargetAmount};

use super::cost_model::CostModel;

const SIZING_EPSILON: f64 = 1e-9;

/// Keep at most `limit` non-zero targets.
///
/// Higher priority wins; ties go to the alphabetically first symbol. Zero
/// targets always pass through. Returns `(kept, dropped)`; each dropped
/// target is returned as given, the caller decides how to flatten it.
pub fn truncate_targets(targets: Vec<Target>, limit: usize) -> (Vec<Target>, Vec<Target>) {
    let (zero, mut active): (Vec<Target>, Vec<Target>) = targets.into_iter().partition(Target::is_zero);
    if active.len() <= limit {
        active.extend(zero);
        return (active, Vec::new());
    }
    active.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.symbol.cmp(&b.symbol)));
    let dropped = active.split_off(limit);
    active.extend(zero);
    (active, dropped)
}

/// Whole shares a target asks for at `raw_price`.
///
/// A weight is sized so that slippage and commission on the full position
/// still fit inside `weight × total_value`.
pub fn resolve_quantity(amount: TargetAmount, raw_price: f64, total_value: f64, cost: &CostModel) -> f64 {
    match amount {
        TargetAmount::Quantity(q) => q,
        TargetAmount::Weight(w) => {
            let per_share = cost.buy_cost_per_share(raw_price);
            if per_share <= 0.0 || !per_share.is_finite() {
                return 0.0;
            }
            // Nudge before flooring so an exact fit is not lost to rounding.
            let shares = ((w * total_value / per_share).abs() + SIZING_EPSILON).floor();
            shares.copysign(w)
        }
    }
}

/// Orders for one rebalance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPlan {
    pub orders: Vec<Order>,
    /// Weight targets that could not be sized because the symbol has no price.
    pub unpriced: Vec<String>,
    /// Targets whose quantity or weight is NaN or infinite.
    pub invalid: Vec<String>,
}

/// Diff the target portfolio against current holdings.
///
/// Held symbols missing from `targets` are sold down to zero. Weight targets
/// for symbols without a price are reported in [`OrderPlan::unpriced`], and
/// non-finite targets in [`OrderPlan::invalid`]; neither produces an order and
/// the existing holding is kept.
///
/// Buys that come from weights are scaled down together when they would cost
/// more than `cash` plus the net proceeds of this plan's sells. Explicit
/// quantity buys are never resized.
pub fn generate_orders<F>(
    targets: &[Target],
    holdings: &HashMap<String, f64>,
    price_of: F,
    total_value: f64,
    cash: f64,
    cost: &CostModel,
) -> OrderPlan
where
    F: Fn(&str) -> Option<f64>,
{
    let mut desired: BTreeMap<&str, f64> = BTreeMap::new();
    let mut weighted: BTreeSet<&str> = BTreeSet::new();
    let mut unpriced = Vec::new();
    let mut invalid = Vec::new();

    for symbol in holdings.keys() {
        desired.insert(symbol.as_str(), 0.0);
    }
    for target in targets {
        let symbol = target.symbol.as_str();
        let quantity = match target.amount {
            TargetAmount::Quantity(q) | TargetAmount::Weight(q) if !q.is_finite() => {
                desired.remove(symbol);
                weighted.remove(symbol);
                invalid.push(target.symbol.clone());
                continue;
            }
            TargetAmount::Quantity(q) => Some(q),
            TargetAmount::Weight(w) if w == 0.0 => Some(0.0),
            TargetAmount::Weight(_) => price_of(symbol)
                .map(|price| resolve_quantity(target.amount, price, total_value, cost)),
        };
        match quantity {
            Some(q) => {
                desired.insert(symbol, q);
                if matches!(target.amount, TargetAmount::Weight(_)) {
                    weighted.insert(symbol);
                } else {
                    weighted.remove(symbol);
                }
            }
            None => {
                // Without a price the holding is left alone.
                desired.remove(symbol);
                weighted.remove(symbol);
                unpriced.push(target.symbol.clone());
            }
        }
    }

    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for (symbol, target_qty) in desired {
        let held = holdings.get(symbol).copied().unwrap_or(0.0);
        let delta = target_qty - held;
        if delta > QUANTITY_EPSILON {
            buys.push(Order::buy(symbol, delta));
        } else if delta < -QUANTITY_EPSILON {
            sells.push(Order::sell(symbol, -delta));
        }
    }

    fit_weighted_buys(&mut buys, &sells, &weighted, &price_of, cash, cost);

    // BTreeMap iteration already yields each group in symbol order.
    sells.extend(buys);
    OrderPlan {
        orders: sells,
        unpriced,
        invalid,
    }
}

/// Shrink weight-sized buys so the whole plan settles within available cash.
///
/// Sells fill first, so the budget is current cash plus their proceeds net of
/// slippage and commission, less what the fixed-quantity buys will cost.
fn fit_weighted_buys<F>(
    buys: &mut Vec<Order>,
    sells: &[Order],
    weighted: &BTreeSet<&str>,
    price_of: &F,
    cash: f64,
    cost: &CostModel,
) where
    F: Fn(&str) -> Option<f64>,
{
    let value_of = |order: &Order, per_share: fn(&CostModel, f64) -> f64| {
        price_of(&order.symbol).map_or(0.0, |p| order.quantity * per_share(cost, p))
    };

    let proceeds: f64 = sells
        .iter()
        .map(|o| value_of(o, CostModel::sell_proceeds_per_share))
        .sum();
    let (mut scalable, mut fixed_cost) = (0.0, 0.0);
    for order in buys.iter() {
        let spend = value_of(order, CostModel::buy_cost_per_share);
        if weighted.contains(order.symbol.as_str()) {
            scalable += spend;
        } else {
            fixed_cost += spend;
        }
    }

    let budget = (cash + proceeds - fixed_cost).max(0.0);
    if scalable <= budget {
        return;
    }
    let scale = budget / scalable;
    for order in buys.iter_mut() {
        if weighted.contains(order.symbol.as_str()) {
            order.quantity = (order.quantity * scale).floor();
        }
    }
    buys.retain(|o| o.quantity > QUANTITY_EPSILON);
}
