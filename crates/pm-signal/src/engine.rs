//! C5 Signal Engine: z-score, adaptive baseline, spike/percentile gates,
//! classification, strategy-hint eligibility, burst detection. Grounded on
//! `examples/original_source/monitor.py::process_bbo_update` (the decision
//! ladder) and structured as a pure function over borrowed state, matching
//! the teacher's `hip3-detector::detector::DislocationDetector::check`.

use chrono::{DateTime, Utc};
use pm_core::stats::{mean, zscore};
use pm_core::{Decision, Direction, GamePhase, Severity, Side, Signal, Strategy};

use crate::adaptive::{adaptive_threshold, percentile_rank};

pub const BASE_SPIKE_THRESHOLD: f64 = 0.003;
const WARMUP_GLOBAL_MIN: usize = 20;
const WARMUP_Z_EXTRA: f64 = 0.1;
const TOP_PERCENTILE: f64 = 50.0;

const SEVERITY_ALERT_Z: f64 = 3.0;
const SEVERITY_WATCH_Z: f64 = 1.5;

const FADE_Z_MIN: f64 = 3.5;
const FADE_Z_MAX: f64 = 6.0;
const FADE_MID_MIN: f64 = 0.25;
const FADE_MID_MAX: f64 = 0.55;
const FADE_SPREAD_MAX: f64 = 0.04;

const TREND_Z_MIN: f64 = 3.5;
const TREND_MID_MIN: f64 = 0.20;
const TREND_MID_MAX: f64 = 0.55;
const TREND_SPREAD_MAX: f64 = 0.10;

const LIQUIDITY_MIN: f64 = 10.0;

pub const BURST_Z_MIN: f64 = 4.5;
pub const BURST_WINDOW_SECS: i64 = 300;

/// The previous same-slug signal, kept by the caller (the Trade Loop) and
/// passed in by reference so burst detection stays pure. Only direction,
/// magnitude and time are needed.
#[derive(Debug, Clone, Copy)]
pub struct PrevSignal {
    pub direction: Direction,
    pub abs_z: f64,
    pub at: DateTime<Utc>,
}

pub struct SignalEngine;

impl SignalEngine {
    /// Evaluates one tick. `history` must include the current `mid` as its
    /// last element (the Market State Store appends before handing back
    /// its history snapshot). `global_deltas` is the process-wide series.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        slug: &str,
        mid: f64,
        delta: f64,
        history: &[f64],
        spread: f64,
        liquidity: f64,
        global_deltas: &[f64],
        prev_signal: Option<&PrevSignal>,
        game_phase: GamePhase,
        now: DateTime<Utc>,
    ) -> Signal {
        let z = zscore(history, mid);
        let abs_z = z.abs();
        let history_mean = mean(history);
        let direction = Direction::from_delta(delta);
        let threshold = adaptive_threshold(global_deltas);

        let decision = Self::gate(delta.abs(), abs_z, threshold, global_deltas);

        let severity = if abs_z >= SEVERITY_ALERT_Z {
            Severity::Alert
        } else if abs_z >= SEVERITY_WATCH_Z {
            Severity::Watch
        } else {
            Severity::Info
        };

        let fade_eligible = Self::fade_eligible(abs_z, mid, spread, liquidity);
        let trend_eligible = Self::trend_eligible(abs_z, mid, spread, liquidity);

        let (strategy_hint, side) = if fade_eligible {
            (Some(Strategy::Fade), Some(Self::fade_side(direction)))
        } else if trend_eligible {
            (Some(Strategy::Trend), Some(Self::trend_side(direction)))
        } else {
            (None, None)
        };

        let burst_label = prev_signal.and_then(|prev| {
            let opposite = prev.direction != direction;
            let within_window =
                now.signed_duration_since(prev.at).num_seconds() < BURST_WINDOW_SECS;
            if opposite && prev.abs_z >= BURST_Z_MIN && within_window {
                Some("MEAN_REVERSION".to_string())
            } else {
                None
            }
        });

        Signal {
            slug: slug.to_string(),
            side,
            mid,
            delta,
            history_mean,
            abs_z,
            direction,
            direction_strength: abs_z,
            spread,
            liquidity,
            decision,
            strategy_hint,
            severity,
            game_phase,
            burst_label,
            created_at: now,
        }
    }

    /// Spike + percentile gate (spec.md §4.5). Warmup (<20 global samples)
    /// bypasses the percentile requirement but demands extra z margin.
    fn gate(abs_delta: f64, abs_z: f64, threshold: f64, global_deltas: &[f64]) -> Decision {
        if abs_delta < BASE_SPIKE_THRESHOLD {
            return Decision::Reject("spike_threshold".to_string());
        }
        if abs_z < threshold {
            return Decision::Reject("z_threshold".to_string());
        }

        if global_deltas.len() < WARMUP_GLOBAL_MIN {
            return if abs_z >= threshold + WARMUP_Z_EXTRA {
                Decision::Accept
            } else {
                Decision::Reject("warmup_z_margin".to_string())
            };
        }

        match percentile_rank(global_deltas, abs_delta) {
            Some(p) if p >= TOP_PERCENTILE => Decision::Accept,
            Some(_) => Decision::Reject("percentile_gate".to_string()),
            None => Decision::Reject("percentile_warmup".to_string()),
        }
    }

    // spec.md §8 boundary test: spread exactly at 0.04 is rejected for
    // FADE admission, i.e. this bound is a strict inequality despite
    // §4.5's "spread ≤ 0.04" phrasing.
    fn fade_eligible(abs_z: f64, mid: f64, spread: f64, liquidity: f64) -> bool {
        (FADE_Z_MIN..FADE_Z_MAX).contains(&abs_z)
            && (FADE_MID_MIN..=FADE_MID_MAX).contains(&mid)
            && spread < FADE_SPREAD_MAX
            && liquidity >= LIQUIDITY_MIN
    }

    fn trend_eligible(abs_z: f64, mid: f64, spread: f64, liquidity: f64) -> bool {
        abs_z >= TREND_Z_MIN
            && (TREND_MID_MIN..=TREND_MID_MAX).contains(&mid)
            && spread <= TREND_SPREAD_MAX
            && liquidity >= LIQUIDITY_MIN
    }

    /// FADE enters OPPOSITE the move: a SPIKE (YES up) is faded by buying
    /// NO; a DIP is faded by buying YES.
    fn fade_side(direction: Direction) -> Side {
        match direction {
            Direction::Spike => Side::BuyNo,
            Direction::Dip => Side::BuyYes,
        }
    }

    /// TREND enters WITH the move.
    fn trend_side(direction: Direction) -> Side {
        match direction {
            Direction::Spike => Side::BuyYes,
            Direction::Dip => Side::BuyNo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_history_with_spike() -> Vec<f64> {
        let mut h = vec![0.4; 49];
        h.push(0.44);
        h
    }

    /// A dead-flat baseline makes the outlier's population z-score exactly
    /// `sqrt(history.len() - 1)` regardless of the outlier's magnitude
    /// (here `sqrt(49) = 7.0`, which lands outside `FADE_Z_MAX`). Use a
    /// baseline with real dispersion so `|z|` lands in the FADE band
    /// `[3.5, 6.0)` instead.
    fn noisy_history_with_spike() -> Vec<f64> {
        let mut h = Vec::with_capacity(50);
        h.extend(std::iter::repeat(0.395).take(25));
        h.extend(std::iter::repeat(0.405).take(24));
        h.push(0.44);
        h
    }

    fn warm_global_deltas() -> Vec<f64> {
        // 100 small deltas so percentile gate has a real population and
        // abs_delta=0.04 (the spike) ranks at the very top.
        let mut v = vec![0.001; 99];
        v.push(0.0001);
        v
    }

    #[test]
    fn accepts_clean_fade_spike() {
        let history = noisy_history_with_spike();
        let deltas = warm_global_deltas();
        let sig = SignalEngine::evaluate(
            "g1",
            0.44,
            0.04,
            &history,
            0.02,
            50.0,
            &deltas,
            None,
            GamePhase::Live,
            Utc::now(),
        );
        assert!((FADE_Z_MIN..FADE_Z_MAX).contains(&sig.abs_z), "got {}", sig.abs_z);
        assert!(sig.decision.is_accept());
        assert_eq!(sig.strategy_hint, Some(Strategy::Fade));
        assert_eq!(sig.side, Some(Side::BuyNo));
    }

    #[test]
    fn rejects_small_delta() {
        let history = flat_history_with_spike();
        let deltas = warm_global_deltas();
        let sig = SignalEngine::evaluate(
            "g1", 0.401, 0.001, &history, 0.02, 50.0, &deltas, None, GamePhase::Live, Utc::now(),
        );
        assert!(!sig.decision.is_accept());
    }

    #[test]
    fn severity_levels() {
        let history = flat_history_with_spike();
        let deltas = warm_global_deltas();
        let sig = SignalEngine::evaluate(
            "g1", 0.44, 0.04, &history, 0.02, 50.0, &deltas, None, GamePhase::Live, Utc::now(),
        );
        assert_eq!(sig.severity, Severity::Alert);
    }

    #[test]
    fn trend_eligible_outside_fade_z_band() {
        // abs_z >= 6.0 is TREND-only (FADE has an exclusive upper bound).
        let mut history = vec![0.4; 49];
        history.push(0.50);
        let deltas = warm_global_deltas();
        let sig = SignalEngine::evaluate(
            "g1", 0.50, 0.10, &history, 0.05, 50.0, &deltas, None, GamePhase::Live, Utc::now(),
        );
        assert!(sig.abs_z >= FADE_Z_MAX);
        assert_eq!(sig.strategy_hint, Some(Strategy::Trend));
        assert_eq!(sig.side, Some(Side::BuyYes));
    }

    #[test]
    fn burst_label_set_on_opposite_recent_large_move() {
        let history = flat_history_with_spike();
        let deltas = warm_global_deltas();
        let now = Utc::now();
        let prev = PrevSignal {
            direction: Direction::Dip,
            abs_z: 5.0,
            at: now - chrono::Duration::seconds(60),
        };
        let sig = SignalEngine::evaluate(
            "g1", 0.44, 0.04, &history, 0.02, 50.0, &deltas, Some(&prev), GamePhase::Live, now,
        );
        assert_eq!(sig.burst_label.as_deref(), Some("MEAN_REVERSION"));
    }

    #[test]
    fn burst_label_absent_when_same_direction() {
        let history = flat_history_with_spike();
        let deltas = warm_global_deltas();
        let now = Utc::now();
        let prev = PrevSignal {
            direction: Direction::Spike,
            abs_z: 5.0,
            at: now - chrono::Duration::seconds(60),
        };
        let sig = SignalEngine::evaluate(
            "g1", 0.44, 0.04, &history, 0.02, 50.0, &deltas, Some(&prev), GamePhase::Live, now,
        );
        assert_eq!(sig.burst_label, None);
    }

    #[test]
    fn boundary_mid_at_020_rejected_for_fade_accepted_for_trend() {
        assert!(!SignalEngine::fade_eligible(4.0, 0.20, 0.02, 50.0));
        assert!(SignalEngine::trend_eligible(4.0, 0.20, 0.02, 50.0));
    }

    #[test]
    fn boundary_spread_at_004_rejected_for_fade() {
        assert!(!SignalEngine::fade_eligible(4.0, 0.30, 0.04, 50.0));
    }

    #[test]
    fn boundary_abs_z_at_6_rejected_for_fade_accepted_for_trend() {
        assert!(!SignalEngine::fade_eligible(6.0, 0.30, 0.02, 50.0));
        assert!(SignalEngine::trend_eligible(6.0, 0.30, 0.02, 50.0));
    }
}
