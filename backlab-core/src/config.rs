//! Backtest configuration — validated once, immutable for the run.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the commission rate (1% of notional).
pub const MAX_COMMISSION_RATE: f64 = 0.01;

/// Calendar cadence used for both rebalancing and bar spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Periods per year for annualizing per-bar statistics.
    pub fn annualization_factor(self) -> f64 {
        match self {
            Frequency::Daily => 252.0,
            Frequency::Weekly => 52.0,
            Frequency::Monthly => 12.0,
        }
    }

    /// Whether `current` opens a new period relative to `previous`.
    ///
    /// Daily: every date. Weekly: a different ISO week. Monthly: a different
    /// calendar month.
    pub fn starts_new_period(self, previous: NaiveDate, current: NaiveDate) -> bool {
        match self {
            Frequency::Daily => current != previous,
            Frequency::Weekly => previous.iso_week() != current.iso_week(),
            Frequency::Monthly => {
                previous.year() != current.year() || previous.month() != current.month()
            }
        }
    }
}

/// Errors from configuration validation and parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("start date {start} must be before end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("commission rate must be within [0, 0.01], got {0}")]
    CommissionOutOfRange(f64),
    #[error("slippage rate must be within [0, 1), got {0}")]
    SlippageOutOfRange(f64),
    #[error("position limit must be at least 1")]
    ZeroPositionLimit,
    #[error("risk-free rate must be finite, got {0}")]
    InvalidRiskFreeRate(f64),
    #[error("VaR confidence level must be within (0, 1), got {0}")]
    InvalidConfidence(f64),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_position_limit() -> usize {
    usize::MAX
}

fn default_var_confidence() -> Vec<f64> {
    vec![0.95, 0.99]
}

/// Parameters for a single backtest run.
///
/// Constructed once per run and passed by reference into every component.
/// Call [`BacktestConfig::validate`] before use; the simulator refuses to
/// start on an invalid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// First simulated date (inclusive).
    pub start_date: NaiveDate,
    /// Last simulated date (inclusive).
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    /// Commission as a fraction of fill notional.
    #[serde(default)]
    pub commission_rate: f64,
    /// Adverse price adjustment as a fraction of the bar price.
    #[serde(default)]
    pub slippage_rate: f64,
    /// Symbol whose closes serve as the benchmark curve.
    #[serde(default)]
    pub benchmark: Option<String>,
    /// Maximum number of simultaneously targeted positions.
    #[serde(default = "default_position_limit")]
    pub position_limit: usize,
    #[serde(default)]
    pub rebalance_freq: Frequency,
    /// Spacing of the feed's bars; drives annualization.
    #[serde(default)]
    pub bar_frequency: Frequency,
    /// Annual risk-free rate used by Sharpe and Sortino.
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Confidence levels for VaR/CVaR.
    #[serde(default = "default_var_confidence")]
    pub var_confidence: Vec<f64>,
}

impl BacktestConfig {
    /// Frictionless daily config with no position limit.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_capital: f64) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital,
            commission_rate: 0.0,
            slippage_rate: 0.0,
            benchmark: None,
            position_limit: default_position_limit(),
            rebalance_freq: Frequency::Daily,
            bar_frequency: Frequency::Daily,
            risk_free_rate: 0.0,
            var_confidence: default_var_confidence(),
        }
    }

    pub fn with_costs(mut self, commission_rate: f64, slippage_rate: f64) -> Self {
        self.commission_rate = commission_rate;
        self.slippage_rate = slippage_rate;
        self
    }

    pub fn with_position_limit(mut self, position_limit: usize) -> Self {
        self.position_limit = position_limit;
        self
    }

    pub fn with_rebalance(mut self, rebalance_freq: Frequency) -> Self {
        self.rebalance_freq = rebalance_freq;
        self
    }

    pub fn with_benchmark(mut self, symbol: impl Into<String>) -> Self {
        self.benchmark = Some(symbol.into());
        self
    }

    /// Parse from TOML. The result is not yet validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date >= self.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if !(0.0..=MAX_COMMISSION_RATE).contains(&self.commission_rate) {
            return Err(ConfigError::CommissionOutOfRange(self.commission_rate));
        }
        if !(0.0..1.0).contains(&self.slippage_rate) {
            return Err(ConfigError::SlippageOutOfRange(self.slippage_rate));
        }
        if self.position_limit == 0 {
            return Err(ConfigError::ZeroPositionLimit);
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::InvalidRiskFreeRate(self.risk_free_rate));
        }
        if let Some(&bad) = self
            .var_confidence
            .iter()
            .find(|c| !(**c > 0.0 && **c < 1.0))
        {
            return Err(ConfigError::InvalidConfidence(bad));
        }
        Ok(())
    }

    /// Whether a date falls inside the simulated range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Deterministic run fingerprint (BLAKE3 of the canonical JSON form).
    ///
    /// Two runs with identical configs share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
