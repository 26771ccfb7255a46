//! C10 Scanner: a read-only observer of the same Market State Store and
//! Reversion Tracker the Trade Loop uses, scoring FADE and TREND
//! opportunity on a periodic tick instead of acting on them. Grounded on
//! the `scanner.py` prototype's `ActivityTracker.get_metrics` — the
//! bracket tables, weights, and alert gate below are its composite-score
//! formulas carried over verbatim.

pub mod http;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use pm_core::GamePhase;
use pm_reversion::ReversionTracker;
use pm_state::MarketStateStore;

pub const Z_TRADEABLE: f64 = 3.5;
pub const Z_MAX_FADE: f64 = 6.0;
pub const Z_WATCH: f64 = 1.5;
pub const Z_MIN_TREND: f64 = 3.5;
pub const MIN_MID: f64 = 0.20;
pub const MAX_MID: f64 = 0.55;
pub const MAX_SPREAD_FADE: f64 = 0.04;
pub const MAX_SPREAD_BASE: f64 = 0.10;
pub const MAX_SPREAD_TREND: f64 = 0.10;
pub const MIN_WARMUP: usize = 20;
pub const PEAK_FRESH_SECS: i64 = 60;

pub const SCORE_HOT: f64 = 65.0;
pub const SCORE_FIRE: f64 = 85.0;
pub const MIN_REVERSION_RATE: f64 = 0.30;
pub const MIN_CONTINUATION_RATE: f64 = 0.40;

const WEIGHT_FADE_READY: f64 = 0.35;
const WEIGHT_REVERSION: f64 = 0.30;
const WEIGHT_VOLATILE: f64 = 0.15;
const WEIGHT_TIGHT: f64 = 0.20;

const WEIGHT_TREND_READY: f64 = 0.35;
const WEIGHT_CONTINUATION: f64 = 0.30;
const WEIGHT_TREND_VOLATILE: f64 = 0.15;
const WEIGHT_TREND_TIGHT: f64 = 0.20;

const PRE_GAME_PENALTY: f64 = 0.3;

const READY_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (1.0, 35.0), (2.0, 60.0), (3.0, 80.0), (5.0, 95.0), (8.0, 100.0)];
const REVERSION_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (15.0, 15.0), (30.0, 40.0), (50.0, 70.0), (70.0, 95.0), (100.0, 100.0)];
const CONTINUATION_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (20.0, 20.0), (40.0, 50.0), (60.0, 75.0), (80.0, 95.0), (100.0, 100.0)];
const VOLATILE_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (2.0, 15.0), (5.0, 35.0), (10.0, 55.0), (20.0, 80.0), (30.0, 100.0)];
const TIGHT_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (3.0, 20.0), (8.0, 45.0), (15.0, 70.0), (25.0, 90.0), (40.0, 100.0)];

/// Piecewise-linear interpolation over an ascending `(threshold, score)`
/// table; clamps to the first/last bracket outside its range.
fn score_linear(value: f64, brackets: &[(f64, f64)]) -> f64 {
    if value <= brackets[0].0 {
        return brackets[0].1;
    }
    if value >= brackets[brackets.len() - 1].0 {
        return brackets[brackets.len() - 1].1;
    }
    for window in brackets.windows(2) {
        let (lo_val, lo_score) = window[0];
        let (hi_val, hi_score) = window[1];
        if lo_val <= value && value <= hi_val {
            let t = if hi_val != lo_val { (value - lo_val) / (hi_val - lo_val) } else { 0.0 };
            return lo_score + t * (hi_score - lo_score);
        }
    }
    brackets[brackets.len() - 1].1
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerSnapshot {
    pub total_markets: usize,
    pub warmed_up: usize,
    pub ready: usize,
    pub volatile: usize,
    pub fade_ready: usize,
    pub trend_ready: usize,
    pub tight_entry: usize,
    pub trend_tight: usize,
    pub reversion_rate: Option<f64>,
    pub continuation_rate: Option<f64>,
    pub fade_composite: f64,
    pub trend_composite: f64,
    pub composite: f64,
    pub fade_alert: bool,
    pub trend_alert: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for ScannerSnapshot {
    fn default() -> Self {
        Self {
            total_markets: 0,
            warmed_up: 0,
            ready: 0,
            volatile: 0,
            fade_ready: 0,
            trend_ready: 0,
            tight_entry: 0,
            trend_tight: 0,
            reversion_rate: None,
            continuation_rate: None,
            fade_composite: 0.0,
            trend_composite: 0.0,
            composite: 0.0,
            fade_alert: false,
            trend_alert: false,
            updated_at: Utc::now(),
        }
    }
}

/// Parallel, read-only consumer of the Market State Store and Reversion
/// Tracker. Holds no position-affecting state; `tick` is side-effect-free
/// except for reading the last-known snapshot cached for the HTTP endpoint.
pub struct Scanner {
    state: Arc<MarketStateStore>,
    reversion: Arc<ReversionTracker>,
    last: RwLock<ScannerSnapshot>,
}

impl Scanner {
    pub fn new(state: Arc<MarketStateStore>, reversion: Arc<ReversionTracker>) -> Self {
        Self {
            state,
            reversion,
            last: RwLock::new(ScannerSnapshot::default()),
        }
    }

    pub fn last_snapshot(&self) -> ScannerSnapshot {
        self.last.read().clone()
    }

    /// Game phase is supplied per-slug by the caller (the Phase Oracle is
    /// out of scope); slugs absent from the map are treated as `Unknown`,
    /// which the pre-game penalty never applies to.
    pub fn tick(&self, game_phases: &HashMap<String, GamePhase>, now: DateTime<Utc>) -> ScannerSnapshot {
        let snapshots = self.state.snapshots();

        let mut warmed_up = 0usize;
        let mut ready = 0usize;
        let mut volatile = 0usize;
        let mut fade_ready = 0usize;
        let mut trend_ready = 0usize;
        let mut tight_entry = 0usize;
        let mut trend_tight = 0usize;
        let (mut fade_phase_live, mut fade_phase_unknown) = (0usize, 0usize);
        let (mut trend_phase_live, mut trend_phase_unknown) = (0usize, 0usize);

        for snap in &snapshots {
            let warm = snap.mid_history.len() >= MIN_WARMUP;
            if warm {
                warmed_up += 1;
                if snap.last_spread < MAX_SPREAD_BASE {
                    ready += 1;
                }
            }
            if snap.last_spread < MAX_SPREAD_FADE {
                tight_entry += 1;
            }
            if snap.last_spread < MAX_SPREAD_TREND {
                trend_tight += 1;
            }

            let peak_fresh = now.signed_duration_since(snap.peak_z_updated_at).num_seconds() < PEAK_FRESH_SECS;
            if !peak_fresh || !warm {
                continue;
            }

            let abs_z = snap.peak_z.abs();
            let mid_ok = (MIN_MID..=MAX_MID).contains(&snap.last_mid);
            if abs_z >= Z_WATCH {
                volatile += 1;
            }

            if abs_z >= Z_TRADEABLE && abs_z < Z_MAX_FADE && mid_ok && snap.last_spread < MAX_SPREAD_FADE {
                fade_ready += 1;
                match game_phases.get(&snap.slug).copied().unwrap_or(GamePhase::Unknown) {
                    GamePhase::Live => fade_phase_live += 1,
                    GamePhase::Pre => {}
                    GamePhase::Post | GamePhase::Unknown => fade_phase_unknown += 1,
                }
            }
            if abs_z >= Z_MIN_TREND && mid_ok && snap.last_spread < MAX_SPREAD_TREND {
                trend_ready += 1;
                match game_phases.get(&snap.slug).copied().unwrap_or(GamePhase::Unknown) {
                    GamePhase::Live => trend_phase_live += 1,
                    GamePhase::Pre => {}
                    GamePhase::Post | GamePhase::Unknown => trend_phase_unknown += 1,
                }
            }
        }

        let reversion_rate = self.reversion.reversion_rate(now);
        let continuation_rate = self.reversion.continuation_rate(now);

        let fade_ready_score = score_linear(fade_ready as f64, READY_BRACKETS);
        let reversion_score = reversion_rate.map(|r| score_linear(r * 100.0, REVERSION_BRACKETS)).unwrap_or(0.0);
        let volatile_score = score_linear(volatile as f64, VOLATILE_BRACKETS);
        let tight_score = score_linear(tight_entry as f64, TIGHT_BRACKETS);

        let mut fade_composite = WEIGHT_FADE_READY * fade_ready_score
            + WEIGHT_REVERSION * reversion_score
            + WEIGHT_VOLATILE * volatile_score
            + WEIGHT_TIGHT * tight_score;
        if fade_ready > 0 && fade_phase_live == 0 && fade_phase_unknown == 0 {
            fade_composite *= PRE_GAME_PENALTY;
        }

        let trend_ready_score = score_linear(trend_ready as f64, READY_BRACKETS);
        let continuation_score = continuation_rate.map(|r| score_linear(r * 100.0, CONTINUATION_BRACKETS)).unwrap_or(0.0);
        let trend_tight_score = score_linear(trend_tight as f64, TIGHT_BRACKETS);

        let mut trend_composite = WEIGHT_TREND_READY * trend_ready_score
            + WEIGHT_CONTINUATION * continuation_score
            + WEIGHT_TREND_VOLATILE * volatile_score
            + WEIGHT_TREND_TIGHT * trend_tight_score;
        if trend_ready > 0 && trend_phase_live == 0 && trend_phase_unknown == 0 {
            trend_composite *= PRE_GAME_PENALTY;
        }

        let composite = fade_composite.max(trend_composite);

        let fade_alert = fade_ready >= 1
            && reversion_rate.is_some_and(|r| r >= MIN_REVERSION_RATE)
            && fade_composite >= SCORE_HOT;
        let trend_alert = trend_ready >= 1
            && continuation_rate.is_some_and(|r| r >= MIN_CONTINUATION_RATE)
            && trend_composite >= SCORE_HOT;

        let snapshot = ScannerSnapshot {
            total_markets: snapshots.len(),
            warmed_up,
            ready,
            volatile,
            fade_ready,
            trend_ready,
            tight_entry,
            trend_tight,
            reversion_rate,
            continuation_rate,
            fade_composite,
            trend_composite,
            composite,
            fade_alert,
            trend_alert,
            updated_at: now,
        };

        *self.last.write() = snapshot.clone();
        snapshot
    }
}
