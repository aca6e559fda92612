//! Equity curve — one (date, total value, cash) sample per simulated bar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Portfolio state at the close of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub date: NaiveDate,
    pub total_value: f64,
    pub cash: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EquityError {
    #[error("equity sample dated {date} does not follow last sample {last}")]
    NonIncreasingDate { date: NaiveDate, last: NaiveDate },
}

/// Append-only equity curve with strictly increasing dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    samples: Vec<EquitySample>,
}

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Build a curve from pre-existing samples, checking date order.
    pub fn from_samples(samples: Vec<EquitySample>) -> Result<Self, EquityError> {
        let mut curve = Self::with_capacity(samples.len());
        for sample in samples {
            curve.record(sample.date, sample.total_value, sample.cash)?;
        }
        Ok(curve)
    }

    /// Append a sample. Rejects dates that do not strictly follow the last one.
    pub fn record(&mut self, date: NaiveDate, total_value: f64, cash: f64) -> Result<(), EquityError> {
        if let Some(last) = self.samples.last() {
            if date <= last.date {
                return Err(EquityError::NonIncreasingDate {
                    date,
                    last: last.date,
                });
            }
        }
        self.samples.push(EquitySample {
            date,
            total_value,
            cash,
        });
        Ok(())
    }

    pub fn samples(&self) -> &[EquitySample] {
        &self.samples
    }

    /// Total value series, in date order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.total_value).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.samples.iter().map(|s| s.date).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&EquitySample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&EquitySample> {
        self.samples.last()
    }
}
