//! Strategy factory — build a boxed strategy from a serializable description.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::reference::{BuyAndHold, EqualWeight, FixedTargets, Momentum};
use super::{Strategy, Target};

#[derive(Debug, Error, PartialEq)]
pub enum StrategyConfigError {
    #[error("unknown strategy '{0}'")]
    Unknown(String),
    #[error("strategy '{name}' requires {field}")]
    MissingField { name: String, field: &'static str },
}

/// Serializable strategy selection, as found in a TOML config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    BuyAndHold { symbol: String },
    EqualWeight {
        #[serde(default)]
        symbols: Vec<String>,
    },
    Momentum { lookback: usize, top_n: usize },
    FixedTargets { targets: Vec<Target> },
}

impl StrategyConfig {
    /// Parse a command-line shorthand: `buy_and_hold:SPY`, `equal_weight`,
    /// `equal_weight:SPY,QQQ`, `momentum:20:3`.
    pub fn parse_shorthand(s: &str) -> Result<Self, StrategyConfigError> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        let missing = |field| StrategyConfigError::MissingField {
            name: name.to_string(),
            field,
        };
        match name {
            "buy_and_hold" => {
                let symbol = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| missing("a symbol"))?;
                Ok(StrategyConfig::BuyAndHold {
                    symbol: symbol.to_string(),
                })
            }
            "equal_weight" => Ok(StrategyConfig::EqualWeight {
                symbols: parts
                    .next()
                    .map(|list| {
                        list.split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            "momentum" => {
                let lookback = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| missing("a lookback"))?;
                let top_n = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| missing("a top_n"))?;
                Ok(StrategyConfig::Momentum { lookback, top_n })
            }
            other => Err(StrategyConfigError::Unknown(other.to_string())),
        }
    }

    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::BuyAndHold { symbol } => Box::new(BuyAndHold::new(symbol.clone())),
            StrategyConfig::EqualWeight { symbols } => Box::new(EqualWeight::new(symbols.clone())),
            StrategyConfig::Momentum { lookback, top_n } => Box::new(Momentum::new(*lookback, *top_n)),
            StrategyConfig::FixedTargets { targets } => Box::new(FixedTargets::new(targets.clone())),
        }
    }
}
