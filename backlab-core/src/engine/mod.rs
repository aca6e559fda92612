//! Backtesting engine — bar-by-bar simulation and supporting infrastructure.
//!
//! The engine consumes an aligned price feed and a strategy, then runs the
//! five-phase bar loop:
//!
//! 1. AdvanceTime: next date in range, positions marked to its closes
//! 2. Evaluate: strategy call on rebalance bars
//! 3. GenerateOrders: targets become sequenced orders
//! 4. Fill: market-on-close fills with slippage and commission
//! 5. RecordEquity: equity sample and ledger identity check

pub mod cancel;
pub mod cost_model;
pub mod orders;
pub mod simulator;

pub use cancel::CancelToken;
pub use cost_model::CostModel;
pub use orders::{generate_orders, resolve_quantity, truncate_targets, OrderPlan};
pub use simulator::{
    ExecutionSimulator, RunLog, RunResult, SimError, SimPhase, SkipEvent, SkipReason,
};
