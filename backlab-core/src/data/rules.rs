//! Typed bar validation rules.
//!
//! A closed set of predicates over bar fields: comparison against a constant,
//! range membership, and comparison between two fields. Rules deserialize
//! from config as tagged variants.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Bar;

/// A numeric field of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub fn value(self, bar: &Bar) -> f64 {
        match self {
            BarField::Open => bar.open,
            BarField::High => bar.high,
            BarField::Low => bar.low,
            BarField::Close => bar.close,
            BarField::Volume => bar.volume as f64,
        }
    }
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
        };
        f.write_str(name)
    }
}

/// Comparison operator. Any comparison involving NaN is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
            CmpOp::Eq => left == right,
            CmpOp::Ne => !left.is_nan() && !right.is_nan() && left != right,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        f.write_str(symbol)
    }
}

/// A single predicate a bar must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BarRule {
    /// `field op value`
    Compare { field: BarField, op: CmpOp, value: f64 },
    /// `min <= field <= max`
    Range { field: BarField, min: f64, max: f64 },
    /// `left op right`
    CrossField {
        left: BarField,
        op: CmpOp,
        right: BarField,
    },
}

impl BarRule {
    pub fn check(&self, bar: &Bar) -> bool {
        match *self {
            BarRule::Compare { field, op, value } => op.apply(field.value(bar), value),
            BarRule::Range { field, min, max } => {
                let v = field.value(bar);
                v >= min && v <= max
            }
            BarRule::CrossField { left, op, right } => op.apply(left.value(bar), right.value(bar)),
        }
    }
}

impl fmt::Display for BarRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarRule::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            BarRule::Range { field, min, max } => write!(f, "{min} <= {field} <= {max}"),
            BarRule::CrossField { left, op, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

/// A bar that failed a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub symbol: String,
    pub date: NaiveDate,
    pub rule: BarRule,
}

/// Basic OHLC sanity: positive prices, high is the top of the range, low the bottom.
pub fn sanity_rules() -> Vec<BarRule> {
    use BarField::*;
    vec![
        BarRule::Compare { field: Open, op: CmpOp::Gt, value: 0.0 },
        BarRule::Compare { field: Close, op: CmpOp::Gt, value: 0.0 },
        BarRule::CrossField { left: High, op: CmpOp::Ge, right: Low },
        BarRule::CrossField { left: High, op: CmpOp::Ge, right: Open },
        BarRule::CrossField { left: High, op: CmpOp::Ge, right: Close },
        BarRule::CrossField { left: Low, op: CmpOp::Le, right: Open },
        BarRule::CrossField { left: Low, op: CmpOp::Le, right: Close },
    ]
}

/// First rule the bar fails, if any.
pub fn first_violation<'r>(bar: &Bar, rules: &'r [BarRule]) -> Option<&'r BarRule> {
    rules.iter().find(|rule| !rule.check(bar))
}

/// Void every non-void bar that fails a rule, returning what was voided.
pub fn apply_rules(bars: &mut [Bar], rules: &[BarRule]) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for bar in bars.iter_mut().filter(|b| !b.is_void()) {
        if let Some(rule) = first_violation(bar, rules) {
            warn!(symbol = %bar.symbol, date = %bar.date, rule = %rule, "bar failed validation, voiding");
            violations.push(RuleViolation {
                symbol: bar.symbol.clone(),
                date: bar.date,
                rule: rule.clone(),
            });
            *bar = Bar::void(&bar.symbol, bar.date);
        }
    }
    violations
}
