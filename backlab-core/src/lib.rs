//! Backlab Core — domain types, price feed, strategy interface, execution simulator.
//!
//! This crate contains the simulation half of the backtester:
//! - Domain types (bars, positions, ledger, trade records, equity curve)
//! - Run configuration with validation and fingerprinting
//! - Aligned price feed, CSV ingest, typed bar rules, synthetic data
//! - Strategy trait with a look-ahead-free bar context
//! - Bar-by-bar execution simulator with five observable phases

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod strategy;

pub use config::{BacktestConfig, ConfigError, Frequency};
pub use data::{AlignedFeed, PriceFeed};
pub use engine::{CancelToken, ExecutionSimulator, RunResult, SimError};
pub use strategy::{BarContext, Strategy, Target, TargetAmount};
