//! Execution simulator — the bar-by-bar event loop.
//!
//! Five phases per bar, driven by [`ExecutionSimulator::step`]:
//! 1. AdvanceTime: move to the next feed date inside the configured range
//! 2. Evaluate: on rebalance bars, ask the strategy for a target portfolio
//! 3. GenerateOrders: truncate to the position limit, size, diff, sequence
//! 4. Fill: execute each order at the bar close with slippage and commission
//! 5. RecordEquity: mark to market, append an equity sample, verify the ledger
//!
//! A failing order is skipped and logged; the run only refuses to start on a
//! bad config or a malformed feed.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BacktestConfig, ConfigError};
use crate::data::{FeedError, PriceFeed};
use crate::domain::{EquityCurve, EquityError, Ledger, LedgerError, Order, TradeRecord};
use crate::strategy::{BarContext, Strategy, Target, TargetAmount};

use super::cancel::CancelToken;
use super::cost_model::CostModel;
use super::orders::{generate_orders, truncate_targets};

/// Errors that prevent a run from starting or continuing.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid feed: {0}")]
    Feed(#[from] FeedError),
    #[error("equity curve: {0}")]
    Equity(#[from] EquityError),
}

/// The phase the simulator will execute on its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimPhase {
    AdvanceTime,
    Evaluate,
    GenerateOrders,
    Fill,
    RecordEquity,
    Done,
}

/// Why an order or target was not executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The security has no price on this bar.
    MissingPrice,
    InsufficientCash { required: f64, available: f64 },
    OverSell { requested: f64, held: f64 },
    InvalidFill,
    /// The strategy asked for a NaN or infinite quantity or weight.
    InvalidTarget,
    /// The target was cut by the position limit.
    PositionLimit,
}

impl SkipReason {
    fn from_ledger(err: &LedgerError) -> Self {
        match *err {
            LedgerError::InsufficientCash {
                required,
                available,
                ..
            } => SkipReason::InsufficientCash {
                required,
                available,
            },
            LedgerError::OverSell {
                requested, held, ..
            } => SkipReason::OverSell { requested, held },
            LedgerError::InvalidFill { .. } => SkipReason::InvalidFill,
        }
    }
}

/// One skipped order or target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEvent {
    pub date: NaiveDate,
    pub bar_index: usize,
    pub symbol: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Ordered record of everything the run declined to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    events: Vec<SkipEvent>,
}

impl RunLog {
    pub fn push(&mut self, event: SkipEvent) {
        warn!(
            date = %event.date,
            symbol = %event.symbol,
            reason = ?event.reason,
            "order skipped"
        );
        self.events.push(event);
    }

    pub fn events(&self) -> &[SkipEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events for one symbol.
    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a SkipEvent> + 'a {
        self.events.iter().filter(move |e| e.symbol == symbol)
    }
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub equity_curve: EquityCurve,
    pub trades: Vec<TradeRecord>,
    pub run_log: RunLog,
    pub final_ledger: Ledger,
    /// Bars fully simulated.
    pub bar_count: usize,
    /// True when the run stopped early on a cancel request.
    pub cancelled: bool,
}

/// Sequential, single-run portfolio simulator.
pub struct ExecutionSimulator<'a> {
    config: &'a BacktestConfig,
    feed: &'a dyn PriceFeed,
    strategy: &'a dyn Strategy,
    cost: CostModel,
    cancel: Option<CancelToken>,

    ledger: Ledger,
    curve: EquityCurve,
    trades: Vec<TradeRecord>,
    run_log: RunLog,

    phase: SimPhase,
    /// Next feed index to consider in AdvanceTime.
    cursor: usize,
    /// Feed index of the bar being processed.
    current: usize,
    /// Bars completed so far in this run.
    bar_index: usize,
    prev_date: Option<NaiveDate>,
    pending_targets: Option<Vec<Target>>,
    pending_orders: Vec<Order>,
    cancelled: bool,
}

impl<'a> ExecutionSimulator<'a> {
    /// Validate inputs and set up a fresh run.
    pub fn new(
        config: &'a BacktestConfig,
        feed: &'a dyn PriceFeed,
        strategy: &'a dyn Strategy,
    ) -> Result<Self, SimError> {
        config.validate()?;
        feed.validate()?;

        let cursor = feed.dates().partition_point(|d| *d < config.start_date);
        Ok(Self {
            config,
            feed,
            strategy,
            cost: CostModel::from_config(config),
            cancel: None,
            ledger: Ledger::new(config.initial_capital),
            curve: EquityCurve::with_capacity(feed.len().saturating_sub(cursor)),
            trades: Vec::new(),
            run_log: RunLog::default(),
            phase: SimPhase::AdvanceTime,
            cursor,
            current: cursor,
            bar_index: 0,
            prev_date: None,
            pending_targets: None,
            pending_orders: Vec::new(),
            cancelled: false,
        })
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn equity_curve(&self) -> &EquityCurve {
        &self.curve
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    /// Execute the current phase and move to the next one.
    ///
    /// Returns the phase that will run on the following call. Stepping a
    /// finished simulator is a no-op.
    pub fn step(&mut self) -> Result<SimPhase, SimError> {
        self.phase = match self.phase {
            SimPhase::AdvanceTime => self.advance_time(),
            SimPhase::Evaluate => self.evaluate(),
            SimPhase::GenerateOrders => self.generate(),
            SimPhase::Fill => self.fill(),
            SimPhase::RecordEquity => self.record_equity()?,
            SimPhase::Done => SimPhase::Done,
        };
        Ok(self.phase)
    }

    /// Drive the loop to completion.
    pub fn run(mut self) -> Result<RunResult, SimError> {
        while self.step()? != SimPhase::Done {}
        info!(
            strategy = self.strategy.name(),
            bars = self.bar_index,
            trades = self.trades.len(),
            skipped = self.run_log.len(),
            final_value = self.ledger.total_value(),
            cancelled = self.cancelled,
            "run complete"
        );
        Ok(RunResult {
            equity_curve: self.curve,
            trades: self.trades,
            run_log: self.run_log,
            final_ledger: self.ledger,
            bar_count: self.bar_index,
            cancelled: self.cancelled,
        })
    }

    // ─── Phases ───

    fn advance_time(&mut self) -> SimPhase {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            info!(bar = self.bar_index, "run cancelled");
            self.cancelled = true;
            return SimPhase::Done;
        }
        let Some(&date) = self.feed.dates().get(self.cursor) else {
            return SimPhase::Done;
        };
        if date > self.config.end_date {
            return SimPhase::Done;
        }
        self.current = self.cursor;
        self.cursor += 1;
        self.mark_positions();
        debug!(%date, bar = self.bar_index, "advance");
        SimPhase::Evaluate
    }

    fn evaluate(&mut self) -> SimPhase {
        let date = self.date();
        let rebalance = match self.prev_date {
            None => true,
            Some(prev) => self.config.rebalance_freq.starts_new_period(prev, date),
        };
        self.pending_targets = None;
        if rebalance {
            let holdings = self.ledger.holdings();
            let ctx = BarContext::new(
                self.feed,
                self.current,
                self.bar_index,
                &holdings,
                self.ledger.total_value(),
                self.ledger.cash(),
            );
            self.pending_targets = self.strategy.on_bar(&ctx);
        }
        SimPhase::GenerateOrders
    }

    fn generate(&mut self) -> SimPhase {
        self.pending_orders.clear();
        let Some(targets) = self.pending_targets.take() else {
            return SimPhase::Fill;
        };

        let (mut kept, dropped) = truncate_targets(targets, self.config.position_limit);
        for target in dropped {
            self.skip(&target.symbol, SkipReason::PositionLimit);
            let flat = match target.amount {
                TargetAmount::Quantity(_) => TargetAmount::Quantity(0.0),
                TargetAmount::Weight(_) => TargetAmount::Weight(0.0),
            };
            kept.push(Target {
                amount: flat,
                ..target
            });
        }

        let holdings = self.ledger.holdings();
        let (feed, current) = (self.feed, self.current);
        let plan = generate_orders(
            &kept,
            &holdings,
            |symbol| feed.close(symbol, current),
            self.ledger.total_value(),
            self.ledger.cash(),
            &self.cost,
        );
        for symbol in &plan.unpriced {
            self.skip(symbol, SkipReason::MissingPrice);
        }
        for symbol in &plan.invalid {
            self.skip(symbol, SkipReason::InvalidTarget);
        }
        self.pending_orders = plan.orders;
        SimPhase::Fill
    }

    fn fill(&mut self) -> SimPhase {
        let orders = std::mem::take(&mut self.pending_orders);
        let date = self.date();
        for order in orders {
            let Some(raw_price) = self.feed.close(&order.symbol, self.current) else {
                self.skip(&order.symbol, SkipReason::MissingPrice);
                continue;
            };
            let (price, slippage) = self.cost.apply_slippage(raw_price, order.side, order.quantity);
            let commission = self.cost.compute_commission(price, order.quantity);

            match self
                .ledger
                .apply_fill(&order.symbol, order.signed_quantity(), price, commission)
            {
                Ok(outcome) => {
                    debug!(
                        symbol = %order.symbol,
                        side = %order.side,
                        quantity = order.quantity,
                        price,
                        commission,
                        "filled"
                    );
                    self.trades.push(TradeRecord {
                        date,
                        bar_index: self.bar_index,
                        symbol: order.symbol,
                        side: order.side,
                        price,
                        quantity: order.quantity,
                        commission,
                        slippage,
                        realized_pnl: outcome.realized_pnl,
                    });
                }
                Err(err) => self.skip(&order.symbol, SkipReason::from_ledger(&err)),
            }
        }
        SimPhase::RecordEquity
    }

    fn record_equity(&mut self) -> Result<SimPhase, SimError> {
        self.mark_positions();
        let total = self.ledger.verify_identity();
        let date = self.date();
        self.curve.record(date, total, self.ledger.cash())?;
        self.prev_date = Some(date);
        self.bar_index += 1;
        Ok(SimPhase::AdvanceTime)
    }

    // ─── Helpers ───

    fn date(&self) -> NaiveDate {
        self.feed.dates()[self.current]
    }

    /// Mark every position to the current close; void bars keep the last mark.
    fn mark_positions(&mut self) {
        let closes: HashMap<String, f64> = self
            .ledger
            .positions()
            .keys()
            .filter_map(|s| self.feed.close(s, self.current).map(|c| (s.clone(), c)))
            .collect();
        for (symbol, close) in closes {
            self.ledger.mark_to_market(&symbol, close);
        }
    }

    fn skip(&mut self, symbol: &str, reason: SkipReason) {
        self.run_log.push(SkipEvent {
            date: self.date(),
            bar_index: self.bar_index,
            symbol: symbol.to_string(),
            reason,
        });
    }
}
