//! Adaptive z-threshold and percentile gating (spec.md §4.5), grounded on
//! `examples/original_source/monitor.py::adaptive_z`/`percentile`.

use pm_core::stats::population_stddev;

pub const Z_BASE: f64 = 0.8;
const ADAPTIVE_FLOOR: f64 = 1.1;
const RATIO_LOWER_CUTOFF: f64 = 1.3;
const RATIO_RAISE_CUTOFF: f64 = 0.7;
const RATIO_LOWER_STEP: f64 = 0.3;
const RATIO_RAISE_STEP: f64 = 0.45;
const GLOBAL_WARMUP_MIN: usize = 50;
const RECENT_WINDOW: usize = 50;

/// Adaptive z-score threshold. Below 50 global samples, use the flat base
/// `Z_BASE`. Otherwise compare the volatility of the last 50 deltas
/// against the full series: a spike in recent volatility (ratio > 1.3)
/// lowers the bar (floored at 1.1); a lull (ratio < 0.7) raises it.
pub fn adaptive_threshold(global_deltas: &[f64]) -> f64 {
    if global_deltas.len() < GLOBAL_WARMUP_MIN {
        return Z_BASE;
    }
    let recent = &global_deltas[global_deltas.len() - RECENT_WINDOW..];
    let sigma_all = population_stddev(global_deltas);
    if sigma_all < 1e-12 {
        return Z_BASE;
    }
    let ratio = population_stddev(recent) / sigma_all;

    if ratio > RATIO_LOWER_CUTOFF {
        (Z_BASE - RATIO_LOWER_STEP).max(ADAPTIVE_FLOOR)
    } else if ratio < RATIO_RAISE_CUTOFF {
        Z_BASE + RATIO_RAISE_STEP
    } else {
        Z_BASE
    }
}

/// Rank-percentile of `|delta|` within the global series, in `[0,100]`.
/// `None` during warmup (< 50 global samples) — same gate `pm_core::stats`
/// uses, re-exported here so callers only need one import for the signal
/// pipeline.
pub fn percentile_rank(global_deltas: &[f64], abs_delta: f64) -> Option<f64> {
    pm_core::stats::percentile_rank(global_deltas, abs_delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_uses_base_threshold() {
        let deltas = vec![0.01; 10];
        assert_eq!(adaptive_threshold(&deltas), Z_BASE);
    }

    #[test]
    fn high_recent_volatility_lowers_threshold_to_floor() {
        let mut deltas = vec![0.001; 200];
        for d in deltas.iter_mut().rev().take(50) {
            *d = 0.05;
        }
        let t = adaptive_threshold(&deltas);
        assert!((t - ADAPTIVE_FLOOR).abs() < 1e-9, "got {t}");
    }

    #[test]
    fn low_recent_volatility_raises_threshold() {
        let mut deltas = vec![0.02; 200];
        for d in deltas.iter_mut().rev().take(50) {
            *d = 0.0001;
        }
        let t = adaptive_threshold(&deltas);
        assert!((t - (Z_BASE + RATIO_RAISE_STEP)).abs() < 1e-9, "got {t}");
    }
}
