//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats:
//! - **JSON**: full round-trip serialization of a run or walk-forward result
//!   with schema versioning
//! - **CSV**: trade log, equity curve and walk-forward windows
//! - **Markdown**: a human-readable single-run report
//!
//! Persisted run manifests include a `schema_version` field. Newer versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use backlab_core::domain::{EquityCurve, TradeRecord};

use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::walk_forward::{Recommendation, WalkForwardResult, WindowResult};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

pub fn export_walk_forward_json(result: &WalkForwardResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize WalkForwardResult to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the fill log as CSV.
///
/// Columns: date, bar_index, symbol, side, price, quantity, notional,
/// commission, slippage, realized_pnl (empty for opening fills)
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "date",
        "bar_index",
        "symbol",
        "side",
        "price",
        "quantity",
        "notional",
        "commission",
        "slippage",
        "realized_pnl",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.date.to_string(),
            &t.bar_index.to_string(),
            &t.symbol,
            &t.side.to_string(),
            &format!("{:.6}", t.price),
            &format!("{:.6}", t.quantity),
            &format!("{:.2}", t.notional()),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.slippage),
            &t.realized_pnl.map(|p| format!("{p:.2}")).unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export an equity curve as CSV with date, total_value and cash columns.
pub fn export_equity_csv(curve: &EquityCurve) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "total_value", "cash"])?;
    for sample in curve.samples() {
        wtr.write_record([
            &sample.date.to_string(),
            &format!("{:.2}", sample.total_value),
            &format!("{:.2}", sample.cash),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export walk-forward windows as CSV, one row per window.
pub fn export_windows_csv(windows: &[WindowResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "window",
        "train_start",
        "train_end",
        "test_start",
        "test_end",
        "total_return",
        "sharpe",
        "max_drawdown",
        "fills",
        "skipped",
    ])?;
    for w in windows {
        wtr.write_record([
            &w.index.to_string(),
            &w.train_start.to_string(),
            &w.train_end.to_string(),
            &w.test_start.to_string(),
            &w.test_end.to_string(),
            &format!("{:.6}", w.total_return),
            &format!("{:.4}", w.sharpe),
            &format!("{:.6}", w.max_drawdown),
            &w.trade_count.to_string(),
            &w.skipped_orders.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{strategy}_{fingerprint prefix}/` under `output_dir` containing:
/// - `manifest.json` — the full `BacktestResult`
/// - `metrics.json` — the metrics alone
/// - `trades.csv` — fill log
/// - `equity.csv` — bar-by-bar equity curve
/// - `report.md` — Markdown summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix = result.config_fingerprint.get(..12).unwrap_or(&result.config_fingerprint);
    let run_dir = output_dir.join(format!("{}_{}", result.strategy, prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("manifest.json"), &export_json(result)?)?;
    let metrics = serde_json::to_string_pretty(&result.metrics)
        .context("failed to serialize metrics to JSON")?;
    write(&run_dir.join("metrics.json"), &metrics)?;
    write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    write(&run_dir.join("equity.csv"), &export_equity_csv(&result.equity_curve)?)?;
    write(&run_dir.join("report.md"), &generate_report(result))?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
///
/// Rejects unknown schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

/// Save `walk_forward.json` and `windows.csv` under `output_dir`.
pub fn save_walk_forward(result: &WalkForwardResult, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create artifact dir: {}", output_dir.display()))?;
    write(&output_dir.join("walk_forward.json"), &export_walk_forward_json(result)?)?;
    write(&output_dir.join("windows.csv"), &export_windows_csv(&result.windows)?)?;
    Ok(output_dir.to_path_buf())
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Strategy | {} |\n", result.strategy));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.start_date, result.end_date
    ));
    md.push_str(&format!("| Initial Capital | ${:.0} |\n", result.initial_capital));
    md.push_str(&format!("| Final Value | ${:.2} |\n", result.final_value));
    md.push_str(&format!("| Bars | {} |\n", result.bar_count));
    md.push_str(&format!("| Fingerprint | {} |\n", result.config_fingerprint));
    if result.cancelled {
        md.push_str("| Status | **CANCELLED** |\n");
    }
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| Annual Return | {:.2}% |\n", m.annual_return * 100.0));
    md.push_str(&format!(
        "| Annual Volatility | {:.2}% |\n",
        m.annual_volatility * 100.0
    ));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Sortino | {:.3} |\n", m.sortino));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    if let (Some(peak), Some(trough)) = (m.drawdown.peak_date, m.drawdown.trough_date) {
        let recovery = m
            .drawdown
            .recovery_date
            .map_or_else(|| "not recovered".to_string(), |d| d.to_string());
        md.push_str(&format!("| Drawdown Span | {peak} → {trough} ({recovery}) |\n"));
    }
    md.push_str(&format!("| Information Ratio | {:.3} |\n", m.information_ratio));
    md.push_str(&format!("| Tracking Error | {:.2}% |\n", m.tracking_error * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Fills | {} |\n", m.trade_count));
    md.push('\n');

    if !m.var.is_empty() {
        md.push_str("## Tail Risk\n\n");
        md.push_str("| Confidence | Parametric VaR | Historical VaR | CVaR |\n");
        md.push_str("| --- | --- | --- | --- |\n");
        for v in &m.var {
            md.push_str(&format!(
                "| {:.0}% | {:.3}% | {:.3}% | {:.3}% |\n",
                v.confidence * 100.0,
                v.parametric * 100.0,
                v.historical * 100.0,
                v.cvar * 100.0
            ));
        }
        md.push('\n');
    }

    md.push_str("## Trading Costs\n\n");
    md.push_str(&format!(
        "Commission ${:.2} ({:.3}% of average equity), slippage ${:.2}.\n\n",
        m.costs.total_commission,
        m.costs.commission_to_avg_equity * 100.0,
        m.costs.total_slippage
    ));
    if !m.costs.by_month.is_empty() {
        md.push_str("| Month | Commission | Slippage | Fills |\n");
        md.push_str("| --- | --- | --- | --- |\n");
        for p in &m.costs.by_month {
            md.push_str(&format!(
                "| {} | {:.2} | {:.2} | {} |\n",
                p.period, p.commission, p.slippage, p.fills
            ));
        }
        md.push('\n');
    }

    if !result.run_log.is_empty() {
        md.push_str("## Skipped Orders\n\n");
        for event in result.run_log.events() {
            md.push_str(&format!(
                "- {} {}: {:?}\n",
                event.date, event.symbol, event.reason
            ));
        }
        md.push('\n');
    }

    md
}

/// One line per recommendation, for logs and terminal output.
pub fn describe_recommendation(rec: &Recommendation) -> String {
    match rec {
        Recommendation::IncreaseRiskControls {
            coefficient_of_variation: Some(cv),
        } => format!("increase risk controls: window returns vary widely (CV {cv:.2})"),
        Recommendation::IncreaseRiskControls {
            coefficient_of_variation: None,
        } => "increase risk controls: window returns scatter around zero".to_string(),
        Recommendation::ImproveConsistency { profitable_fraction } => format!(
            "improve consistency: only {:.0}% of windows were profitable",
            profitable_fraction * 100.0
        ),
        Recommendation::TightenDrawdownLimits { mean_max_drawdown } => format!(
            "tighten drawdown limits: mean window drawdown {:.1}%",
            mean_max_drawdown * 100.0
        ),
        Recommendation::ReviewStrategy { robustness_score } => {
            format!("review strategy: robustness score {robustness_score:.2}")
        }
        Recommendation::InsufficientData => {
            "insufficient data: the range does not fit one train/test window".to_string()
        }
    }
}
