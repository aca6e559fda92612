//! Domain types for Backlab

pub mod bar;
pub mod equity;
pub mod ledger;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::{Bar, MarketStatus};
pub use equity::{EquityCurve, EquityError, EquitySample};
pub use ledger::{FillOutcome, Ledger, LedgerError};
pub use order::{Order, OrderSide};
pub use position::Position;
pub use trade::TradeRecord;
