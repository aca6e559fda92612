//! Parameter sweeps — many independent backtests over one feed, run on rayon.

use std::collections::HashMap;

use rayon::prelude::*;

use backlab_core::strategy::StrategyConfig;
use backlab_core::{BacktestConfig, PriceFeed};

use crate::runner::{run_backtest, BacktestResult, RunError};

/// One point of a sweep: a strategy and the config it runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepCase {
    pub label: String,
    pub config: BacktestConfig,
    pub strategy: StrategyConfig,
}

/// Momentum parameter grid crossed with commission levels.
#[derive(Debug, Clone)]
pub struct ParamGrid {
    pub lookbacks: Vec<usize>,
    pub top_ns: Vec<usize>,
    /// Commission rates to test; empty keeps the base config's rate.
    pub commission_rates: Vec<f64>,
}

impl ParamGrid {
    /// Lookbacks 20/60/120, top 1/3/5, base commission.
    pub fn momentum_default() -> Self {
        Self {
            lookbacks: vec![20, 60, 120],
            top_ns: vec![1, 3, 5],
            commission_rates: Vec::new(),
        }
    }

    /// Returns the total number of cases in this grid.
    pub fn size(&self) -> usize {
        self.lookbacks.len() * self.top_ns.len() * self.commission_rates.len().max(1)
    }

    /// Generates all cases in the grid, in lookback, top_n, commission order.
    pub fn generate_cases(&self, base: &BacktestConfig) -> Vec<SweepCase> {
        let rates = if self.commission_rates.is_empty() {
            vec![base.commission_rate]
        } else {
            self.commission_rates.clone()
        };

        let mut cases = Vec::with_capacity(self.size());
        for &lookback in &self.lookbacks {
            for &top_n in &self.top_ns {
                for &rate in &rates {
                    let mut config = base.clone();
                    config.commission_rate = rate;
                    cases.push(SweepCase {
                        label: format!("momentum:{lookback}:{top_n}@{rate}"),
                        config,
                        strategy: StrategyConfig::Momentum { lookback, top_n },
                    });
                }
            }
        }
        cases
    }
}

/// Parameter sweep executor.
///
/// Runs every case against the same feed, optionally in parallel. Cases share
/// no mutable state.
#[derive(Debug, Clone, Copy)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run all cases; the first failing case aborts the sweep.
    pub fn run(
        &self,
        cases: &[SweepCase],
        feed: &dyn PriceFeed,
    ) -> Result<SweepResults, RunError> {
        let run_case = |case: &SweepCase| {
            let strategy = case.strategy.build();
            run_backtest(&case.config, feed, strategy.as_ref())
                .map(|result| (case.label.clone(), result))
        };

        let results = if self.parallel {
            cases.par_iter().map(run_case).collect::<Result<Vec<_>, _>>()?
        } else {
            cases.iter().map(run_case).collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(results))
    }

    /// Generate a grid's cases against `base` and run them.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &BacktestConfig,
        feed: &dyn PriceFeed,
    ) -> Result<SweepResults, RunError> {
        self.run(&grid.generate_cases(base), feed)
    }
}

/// Results from a parameter sweep, in case order.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<(String, BacktestResult)>,
    by_label: HashMap<String, usize>,
}

impl SweepResults {
    fn new(results: Vec<(String, BacktestResult)>) -> Self {
        let by_label = results
            .iter()
            .enumerate()
            .map(|(i, (label, _))| (label.clone(), i))
            .collect();
        Self { results, by_label }
    }

    pub fn all(&self) -> &[(String, BacktestResult)] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&BacktestResult> {
        self.by_label.get(label).map(|&i| &self.results[i].1)
    }

    /// Results sorted by Sharpe ratio, best first.
    pub fn sorted_by_sharpe(&self) -> Vec<(&str, &BacktestResult)> {
        let mut sorted: Vec<_> = self.results.iter().map(|(l, r)| (l.as_str(), r)).collect();
        sorted.sort_by(|a, b| b.1.metrics.sharpe.total_cmp(&a.1.metrics.sharpe));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<(&str, &BacktestResult)> {
        self.sorted_by_sharpe().into_iter().take(n).collect()
    }

    pub fn best(&self) -> Option<(&str, &BacktestResult)> {
        self.sorted_by_sharpe().into_iter().next()
    }
}
