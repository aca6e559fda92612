//! Tail risk — Value at Risk and Conditional VaR per confidence level.
//!
//! All values are return quantiles: a VaR of -0.02 at 95% means one period in
//! twenty is expected to lose at least 2%. Functions are pure: period returns
//! in, scalar out.

use serde::{Deserialize, Serialize};

use crate::metrics::{mean_f64, std_dev};

/// VaR and CVaR at a single confidence level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: f64,
    /// Normal-distribution VaR from the sample mean and deviation.
    pub parametric: f64,
    /// Empirical quantile with linear interpolation.
    pub historical: f64,
    /// Mean of returns at or below the historical VaR.
    pub cvar: f64,
}

/// Estimate VaR/CVaR at each requested confidence level.
pub fn var_estimates(returns: &[f64], confidence_levels: &[f64]) -> Vec<VarEstimate> {
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    confidence_levels
        .iter()
        .map(|&confidence| {
            let historical = sorted_quantile(&sorted, 1.0 - confidence);
            VarEstimate {
                confidence,
                parametric: parametric_var(returns, confidence),
                historical,
                cvar: tail_mean(&sorted, historical),
            }
        })
        .collect()
}

/// Parametric VaR: `mean + z(1 − confidence) · std`.
pub fn parametric_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    mean_f64(returns) + normal_quantile(1.0 - confidence) * std_dev(returns)
}

/// Historical VaR: the `(1 − confidence)` empirical quantile of returns.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted_quantile(&sorted, 1.0 - confidence)
}

/// Conditional VaR: mean of the returns at or below the historical VaR.
pub fn cvar(returns: &[f64], confidence: f64) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    tail_mean(&sorted, sorted_quantile(&sorted, 1.0 - confidence))
}

/// Inverse CDF of the standard normal distribution.
///
/// Acklam's rational approximation, relative error below 1.2e-9 on (0, 1).
/// Returns ±infinity at the bounds and NaN outside them.
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Linearly interpolated quantile of an ascending slice. 0 when empty.
fn sorted_quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn tail_mean(sorted: &[f64], threshold: f64) -> f64 {
    let cut = sorted.partition_point(|r| *r <= threshold);
    if cut == 0 {
        return threshold;
    }
    mean_f64(&sorted[..cut])
}
