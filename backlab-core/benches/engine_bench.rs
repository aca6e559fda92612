//! Criterion benchmarks for Backlab hot paths.
//!
//! Benchmarks:
//! 1. Bar event loop (full simulation, single and multi-symbol)
//! 2. Order generation (truncate, size, diff)
//! 3. Ledger fills

use std::collections::HashMap;

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use backlab_core::data::{synthetic_feed, PriceFeed};
use backlab_core::domain::Ledger;
use backlab_core::engine::{generate_orders, truncate_targets, CostModel};
use backlab_core::strategy::{BuyAndHold, EqualWeight, Momentum};
use backlab_core::{BacktestConfig, ExecutionSimulator, Frequency, Target};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 2).unwrap()
}

fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SYM{i:03}")).collect()
}

// ── 1. Bar Event Loop ────────────────────────────────────────────────

fn bench_bar_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("bar_event_loop");

    for &bar_count in &[252, 1260, 2520] {
        let feed = synthetic_feed(&["SPY"], start(), bar_count, 42);
        let end = *feed.dates().last().unwrap();
        let config = BacktestConfig::new(start(), end, 100_000.0).with_costs(0.001, 0.0005);
        let strategy = BuyAndHold::new("SPY");

        group.bench_with_input(
            BenchmarkId::new("buy_and_hold", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| {
                    ExecutionSimulator::new(black_box(&config), black_box(&feed), &strategy)
                        .and_then(|sim| sim.run())
                })
            },
        );
    }

    // Multi-symbol benchmark (the realistic case)
    let names = symbols(10);
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let feed = synthetic_feed(&refs, start(), 1260, 7);
    let end = *feed.dates().last().unwrap();
    let config = BacktestConfig::new(start(), end, 1_000_000.0)
        .with_costs(0.001, 0.0005)
        .with_rebalance(Frequency::Weekly)
        .with_position_limit(5);

    let momentum = Momentum::new(60, 5);
    group.bench_function("10_symbols_1260_bars_momentum", |b| {
        b.iter(|| ExecutionSimulator::new(black_box(&config), black_box(&feed), &momentum).and_then(|sim| sim.run()))
    });

    let equal = EqualWeight::default();
    group.bench_function("10_symbols_1260_bars_equal_weight", |b| {
        b.iter(|| ExecutionSimulator::new(black_box(&config), black_box(&feed), &equal).and_then(|sim| sim.run()))
    });

    group.finish();
}

// ── 2. Order Generation ──────────────────────────────────────────────

fn bench_order_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_generation");

    let names = symbols(100);
    let targets: Vec<Target> = names
        .iter()
        .enumerate()
        .map(|(i, s)| Target::weight(s.clone(), 0.01).with_priority((i % 7) as i32))
        .collect();
    let holdings: HashMap<String, f64> = names
        .iter()
        .step_by(2)
        .map(|s| (s.clone(), 25.0))
        .collect();
    let cost = CostModel::new(0.0005, 0.001);

    group.bench_function("truncate_100_to_20", |b| {
        b.iter(|| truncate_targets(black_box(targets.clone()), 20))
    });

    group.bench_function("diff_100_targets", |b| {
        b.iter(|| {
            generate_orders(
                black_box(&targets),
                black_box(&holdings),
                |_| Some(50.0),
                1_000_000.0,
                250_000.0,
                &cost,
            )
        })
    });

    group.finish();
}

// ── 3. Ledger Fills ──────────────────────────────────────────────────

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");
    let names = symbols(50);

    group.bench_function("buy_then_sell_50_symbols", |b| {
        b.iter(|| {
            let mut ledger = Ledger::new(10_000_000.0);
            for s in &names {
                let _ = ledger.apply_fill(s, 100.0, 50.0, 5.0);
            }
            for s in &names {
                let _ = ledger.apply_fill(s, -100.0, 51.0, 5.1);
            }
            black_box(ledger.total_value())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_bar_loop, bench_order_generation, bench_ledger);
criterion_main!(benches);
