//! End-to-end simulator scenarios.
//!
//! Each test builds a small deterministic feed, runs a scripted or reference
//! strategy through `ExecutionSimulator`, and checks the ledger, trade log,
//! equity curve and run log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use backlab_core::data::{align_symbols, AlignedFeed};
use backlab_core::domain::{Bar, OrderSide};
use backlab_core::engine::{SimError, SkipReason};
use backlab_core::strategy::{BuyAndHold, FixedTargets};
use backlab_core::{
    BacktestConfig, BarContext, CancelToken, ExecutionSimulator, Frequency, RunResult, Strategy,
    Target,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn day(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset as i64)
}

fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c.is_nan() {
                Bar::void(symbol, day(i))
            } else {
                Bar {
                    symbol: symbol.into(),
                    date: day(i),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 1_000,
                }
            }
        })
        .collect()
}

fn feed(series: &[(&str, Vec<f64>)]) -> AlignedFeed {
    let map: HashMap<String, Vec<Bar>> = series
        .iter()
        .map(|(s, closes)| (s.to_string(), bars_from_closes(s, closes)))
        .collect();
    align_symbols(map)
}

fn config(capital: f64) -> BacktestConfig {
    BacktestConfig::new(day(0), day(365), capital)
}

fn run(config: &BacktestConfig, feed: &AlignedFeed, strategy: &dyn Strategy) -> RunResult {
    ExecutionSimulator::new(config, feed, strategy)
        .unwrap()
        .run()
        .unwrap()
}

/// Returns the scripted targets for each bar index; `None` past the end.
struct Scripted(Vec<Option<Vec<Target>>>);

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        self.0.get(ctx.bar_index).cloned().flatten()
    }
}

/// Counts strategy invocations.
#[derive(Default)]
struct Counting(AtomicUsize);

impl Strategy for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn on_bar(&self, _ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        None
    }
}

// ── Scenario A: linear doubling, full allocation ─────────────────────

#[test]
fn full_allocation_doubles_with_price() {
    let closes: Vec<f64> = (0..100).map(|i| 100.0 + 100.0 * i as f64 / 99.0).collect();
    let feed = feed(&[("SPY", closes)]);
    let cfg = config(100_000.0);
    let result = run(&cfg, &feed, &BuyAndHold::new("SPY"));

    assert_eq!(result.bar_count, 100);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].quantity, 1_000.0);

    let values = result.equity_curve.values();
    let total_return = values[99] / cfg.initial_capital - 1.0;
    assert!((total_return - 1.0).abs() < 1e-9, "total return {total_return}");
    assert!(values.windows(2).all(|w| w[1] >= w[0]), "equity never dips");
}

// ── Scenario B: exact commission accounting ──────────────────────────

#[test]
fn round_trip_loses_only_commissions() {
    let feed = feed(&[("SPY", vec![100.0, 100.0, 100.0])]);
    let cfg = config(10_010.0).with_costs(0.001, 0.0);
    let strategy = Scripted(vec![
        Some(vec![Target::quantity("SPY", 100.0)]),
        Some(vec![]),
    ]);
    let result = run(&cfg, &feed, &strategy);

    assert_eq!(result.trades.len(), 2);
    let buy = &result.trades[0];
    assert_eq!(buy.side, OrderSide::Buy);
    assert!((buy.notional() + buy.commission - 10_010.0).abs() < 1e-9);

    let first = result.equity_curve.samples()[0];
    assert!(first.cash.abs() < 1e-6);

    let sell = &result.trades[1];
    assert_eq!(sell.side, OrderSide::Sell);
    assert!((sell.realized_pnl.unwrap() + 10.0).abs() < 1e-9);

    let final_value = result.final_ledger.total_value();
    assert!((final_value - 9_990.0).abs() < 1e-9);
    assert!((result.final_ledger.total_commission() - 20.0).abs() < 1e-9);
    assert!(result.final_ledger.positions().is_empty());
}

// ── Scenario D: unaffordable order is skipped ────────────────────────

#[test]
fn unaffordable_order_is_skipped_and_logged() {
    let feed = feed(&[("SPY", vec![100.0, 100.0])]);
    let cfg = config(1_000.0);
    let strategy = Scripted(vec![Some(vec![Target::quantity("SPY", 100.0)])]);
    let result = run(&cfg, &feed, &strategy);

    assert!(result.trades.is_empty());
    assert_eq!(result.final_ledger.cash(), 1_000.0);
    assert!(result.final_ledger.positions().is_empty());
    assert_eq!(result.run_log.len(), 1);
    let event = &result.run_log.events()[0];
    assert_eq!(event.symbol, "SPY");
    assert!(matches!(event.reason, SkipReason::InsufficientCash { .. }));
    assert_eq!(result.equity_curve.values(), vec![1_000.0, 1_000.0]);
}

#[test]
fn selling_more_than_held_is_skipped() {
    let feed = feed(&[("SPY", vec![10.0, 10.0])]);
    let cfg = config(1_000.0);
    let strategy = Scripted(vec![
        Some(vec![Target::quantity("SPY", 5.0)]),
        Some(vec![Target::quantity("SPY", -5.0)]),
    ]);
    let result = run(&cfg, &feed, &strategy);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.final_ledger.quantity("SPY"), 5.0);
    assert!(matches!(
        result.run_log.events()[0].reason,
        SkipReason::OverSell { .. }
    ));
}

// ── Weight rotation under costs ──────────────────────────────────────

#[test]
fn full_weight_rotation_stays_invested() {
    let flat = vec![100.0; 3];
    let feed = feed(&[("AAA", flat.clone()), ("BBB", flat)]);
    let cfg = config(1_000_000.0).with_costs(0.001, 0.0);
    let strategy = Scripted(vec![
        Some(vec![Target::weight("AAA", 1.0)]),
        Some(vec![Target::weight("BBB", 1.0)]),
    ]);
    let result = run(&cfg, &feed, &strategy);

    assert!(result.run_log.is_empty(), "{:?}", result.run_log.events());
    assert_eq!(result.final_ledger.quantity("AAA"), 0.0);
    // Sell costs leave 998_002 cash, enough for 9_970 shares at 100.1 each.
    assert_eq!(result.final_ledger.quantity("BBB"), 9_970.0);
    assert!(result.final_ledger.cash() >= 0.0);
    assert!(result.final_ledger.cash() < 100.1);
}

#[test]
fn non_finite_target_is_logged_and_holding_kept() {
    let feed = feed(&[("SPY", vec![10.0, 10.0])]);
    let cfg = config(1_000.0);
    let strategy = Scripted(vec![
        Some(vec![Target::quantity("SPY", 5.0)]),
        Some(vec![Target::weight("SPY", f64::NAN)]),
    ]);
    let result = run(&cfg, &feed, &strategy);

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.final_ledger.quantity("SPY"), 5.0);
    assert_eq!(result.run_log.len(), 1);
    assert_eq!(result.run_log.events()[0].bar_index, 1);
    assert_eq!(result.run_log.events()[0].reason, SkipReason::InvalidTarget);
}

// ── Missing data ─────────────────────────────────────────────────────

#[test]
fn void_bar_skips_symbol_and_carries_mark() {
    let feed = feed(&[
        ("SPY", vec![100.0, 101.0, 102.0]),
        ("QQQ", vec![50.0, f64::NAN, 60.0]),
    ]);
    let cfg = config(10_000.0);
    let strategy = Scripted(vec![
        Some(vec![Target::quantity("QQQ", 10.0)]),
        Some(vec![Target::quantity("QQQ", 10.0), Target::quantity("SPY", 10.0)]),
        None,
    ]);
    let result = run(&cfg, &feed, &strategy);

    assert_eq!(result.bar_count, 3);
    // Bar 1: QQQ has no price, so its mark stays at 50 while SPY trades.
    let second = result.equity_curve.samples()[1];
    assert!((second.total_value - 10_000.0).abs() < 1e-9);
    assert!((second.cash - 8_490.0).abs() < 1e-9);
    assert_eq!(result.final_ledger.quantity("SPY"), 10.0);
    // Bar 2: QQQ re-marked at 60
    let last = result.equity_curve.last().unwrap();
    assert!((last.total_value - (10_000.0 + 100.0 + 10.0)).abs() < 1e-9);
}

#[test]
fn order_for_void_symbol_is_logged_as_missing_price() {
    let feed = feed(&[("SPY", vec![100.0, 100.0]), ("QQQ", vec![f64::NAN, 50.0])]);
    let cfg = config(10_000.0);
    let strategy = Scripted(vec![Some(vec![Target::quantity("QQQ", 1.0)])]);
    let result = run(&cfg, &feed, &strategy);
    assert!(result.trades.is_empty());
    assert_eq!(result.run_log.events()[0].reason, SkipReason::MissingPrice);
    assert_eq!(result.run_log.for_symbol("QQQ").count(), 1);
}

// ── Position limit ───────────────────────────────────────────────────

#[test]
fn position_limit_keeps_highest_priority() {
    let flat = [10.0, 10.0];
    let feed = feed(&[("AAA", flat.to_vec()), ("BBB", flat.to_vec()), ("CCC", flat.to_vec())]);
    let cfg = config(3_000.0).with_position_limit(2);
    let strategy = FixedTargets::new(vec![
        Target::weight("AAA", 0.3).with_priority(1),
        Target::weight("BBB", 0.3).with_priority(3),
        Target::weight("CCC", 0.3).with_priority(2),
    ]);
    let result = run(&cfg, &feed, &strategy);

    let held: Vec<&String> = {
        let mut v: Vec<&String> = result.final_ledger.positions().keys().collect();
        v.sort();
        v
    };
    assert_eq!(held, vec!["BBB", "CCC"]);
    assert!(result
        .run_log
        .events()
        .iter()
        .any(|e| e.symbol == "AAA" && e.reason == SkipReason::PositionLimit));
}

// ── Rebalance frequency ──────────────────────────────────────────────

#[test]
fn weekly_rebalance_evaluates_on_new_iso_weeks() {
    // 2024-01-01 is a Monday; 14 consecutive days span two ISO weeks.
    let closes = vec![100.0; 14];
    let feed = feed(&[("SPY", closes)]);
    let cfg = config(1_000.0).with_rebalance(Frequency::Weekly);
    let strategy = Counting::default();
    run(&cfg, &feed, &strategy);
    assert_eq!(strategy.0.load(Ordering::SeqCst), 2);
}

#[test]
fn monthly_rebalance_evaluates_on_first_bar_and_month_starts() {
    let closes = vec![100.0; 40];
    let feed = feed(&[("SPY", closes)]);
    let cfg = config(1_000.0).with_rebalance(Frequency::Monthly);
    let strategy = Counting::default();
    run(&cfg, &feed, &strategy);
    // Jan 1 (first bar) and Feb 1
    assert_eq!(strategy.0.load(Ordering::SeqCst), 2);
}

#[test]
fn daily_rebalance_evaluates_every_bar() {
    let closes = vec![100.0; 10];
    let feed = feed(&[("SPY", closes)]);
    let strategy = Counting::default();
    run(&config(1_000.0), &feed, &strategy);
    assert_eq!(strategy.0.load(Ordering::SeqCst), 10);
}

// ── Cancellation ─────────────────────────────────────────────────────

struct CancelAt {
    bar: usize,
    token: CancelToken,
}

impl Strategy for CancelAt {
    fn name(&self) -> &str {
        "cancel_at"
    }

    fn on_bar(&self, ctx: &BarContext<'_>) -> Option<Vec<Target>> {
        if ctx.bar_index == self.bar {
            self.token.cancel();
        }
        None
    }
}

#[test]
fn cancel_stops_between_bars() {
    let closes = vec![100.0; 10];
    let feed = feed(&[("SPY", closes)]);
    let cfg = config(1_000.0);
    let token = CancelToken::new();
    let strategy = CancelAt {
        bar: 2,
        token: token.clone(),
    };
    let result = ExecutionSimulator::new(&cfg, &feed, &strategy)
        .unwrap()
        .with_cancel(token)
        .run()
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.bar_count, 3);
    assert_eq!(result.equity_curve.len(), 3);
}

#[test]
fn pre_cancelled_run_simulates_nothing() {
    let feed = feed(&[("SPY", vec![100.0, 100.0])]);
    let cfg = config(1_000.0);
    let token = CancelToken::new();
    token.cancel();
    let result = ExecutionSimulator::new(&cfg, &feed, &Counting::default())
        .unwrap()
        .with_cancel(token)
        .run()
        .unwrap();
    assert!(result.cancelled);
    assert!(result.equity_curve.is_empty());
}

// ── Pre-run validation ───────────────────────────────────────────────

#[test]
fn unordered_feed_aborts_before_start() {
    let mut feed = feed(&[("SPY", vec![100.0, 100.0])]);
    feed.dates.reverse();
    let cfg = config(1_000.0);
    let strategy = Counting::default();
    assert!(matches!(
        ExecutionSimulator::new(&cfg, &feed, &strategy),
        Err(SimError::Feed(_))
    ));
    assert_eq!(strategy.0.load(Ordering::SeqCst), 0);
}

#[test]
fn ledger_identity_holds_every_bar() {
    let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
    let other: Vec<f64> = (0..30).map(|i| 50.0 + (i as f64 * 0.3).cos() * 3.0).collect();
    let feed = feed(&[("AAA", closes), ("BBB", other)]);
    let cfg = config(10_000.0).with_costs(0.001, 0.0005);
    let strategy = backlab_core::strategy::EqualWeight::default();

    let mut sim = ExecutionSimulator::new(&cfg, &feed, &strategy).unwrap();
    let mut last_len = 0;
    while sim.step().unwrap() != backlab_core::engine::SimPhase::Done {
        if sim.equity_curve().len() != last_len {
            last_len = sim.equity_curve().len();
            let ledger = sim.ledger();
            let positions: f64 = ledger
                .positions()
                .values()
                .map(|p| p.quantity * p.last_price)
                .sum();
            let sample = sim.equity_curve().last().unwrap();
            assert!((sample.total_value - (ledger.cash() + positions)).abs() < 1e-6);
            assert!(ledger.cash() >= -1e-6);
        }
    }
    assert_eq!(last_len, 30);
}
