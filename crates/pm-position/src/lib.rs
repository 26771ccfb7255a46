//! C8 Exit Evaluator. A pure function of `(Position, executable_price,
//! now, source_age)`: it never mutates the position it's given and never
//! touches a Broker or the network. The caller (Broker) applies the
//! returned peak/trailing/tick updates back onto its own copy of the
//! position. Grounded on the teacher's `hip3-position::exit` module,
//! which keeps the identical pure-function shape over a `PositionState`
//! borrow.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use pm_core::{Side, Strategy};

const PEAK_DECAY_PERIOD_SECS: i64 = 60;
const PEAK_DECAY_RATE: f64 = 0.25;
const STALE_SOURCE_AGE_SECS: i64 = 30;

pub struct StrategyThresholds {
    pub tp: f64,
    pub sl: f64,
    pub time_sec: i64,
    pub be_sec: i64,
    pub be_tol: f64,
    pub trail_activate: f64,
    pub trail_stop: f64,
}

pub fn thresholds(strategy: Strategy) -> StrategyThresholds {
    match strategy {
        Strategy::Fade => StrategyThresholds {
            tp: 0.10,
            sl: 0.04,
            time_sec: 720,
            be_sec: 480,
            be_tol: 0.015,
            trail_activate: 0.04,
            trail_stop: 0.025,
        },
        Strategy::Trend => StrategyThresholds {
            tp: 0.12,
            sl: 0.05,
            time_sec: 480,
            be_sec: 240,
            be_tol: 0.010,
            trail_activate: 0.035,
            trail_stop: 0.020,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Breakeven,
    Time,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "tp",
            ExitReason::StopLoss => "sl",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Breakeven => "breakeven",
            ExitReason::Time => "time_exit",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub exit_price: f64,
    pub profit_pct: f64,
}

/// An open position as owned by a Broker. `order_id` is `None` for a
/// `PaperBroker` position.
#[derive(Debug, Clone)]
pub struct Position {
    pub slug: String,
    pub side: Side,
    pub qty: f64,
    pub entry_mid: f64,
    pub entry_time: DateTime<Utc>,
    pub fill_price: f64,
    pub cost_basis: f64,
    pub fee_open: f64,
    pub z_score: f64,
    pub peak_profit_pct: f64,
    pub trailing_active: bool,
    pub peak_updated_at: DateTime<Utc>,
    pub consecutive_profit_ticks: u32,
    pub strategy: Strategy,
    pub order_id: Option<String>,
}

/// Result of one evaluation tick: an optional close decision plus the
/// refreshed peak-tracking fields the caller should write back onto its
/// `Position`.
#[derive(Debug, Clone)]
pub struct ExitEvaluation {
    pub decision: Option<ExitDecision>,
    pub peak_profit_pct: f64,
    pub trailing_active: bool,
    pub peak_updated_at: DateTime<Utc>,
    pub consecutive_profit_ticks: u32,
}

/// Evaluates one tick against the five priority-ordered exit rules.
/// `source_age` is how old the BBO the `executable_price` derives from is;
/// when it exceeds 30s AND the price hasn't moved off entry, TP/SL/
/// trailing are suppressed for this tick (time/breakeven still fire).
pub fn evaluate_exit(
    position: &Position,
    executable_price: f64,
    now: DateTime<Utc>,
    source_age: Duration,
) -> ExitEvaluation {
    let t = thresholds(position.strategy);
    let profit_pct = position.side.profit_pct(position.entry_mid, executable_price);
    let age = now.signed_duration_since(position.entry_time);

    let stale = (executable_price - position.entry_mid).abs() < 1e-12
        && source_age > Duration::seconds(STALE_SOURCE_AGE_SECS);

    let (peak_profit_pct, trailing_active, peak_updated_at, consecutive_profit_ticks) = if stale {
        (
            position.peak_profit_pct,
            position.trailing_active,
            position.peak_updated_at,
            position.consecutive_profit_ticks,
        )
    } else {
        update_peak(position, profit_pct, now, &t)
    };

    let decision = if stale {
        breakeven_or_time(&t, age, profit_pct, executable_price)
    } else {
        take_profit_or_stop(&t, profit_pct, executable_price)
            .or_else(|| {
                trailing_stop(
                    &t,
                    trailing_active,
                    profit_pct,
                    peak_profit_pct,
                    consecutive_profit_ticks,
                    executable_price,
                )
            })
            .or_else(|| breakeven_or_time(&t, age, profit_pct, executable_price))
    };

    ExitEvaluation {
        decision,
        peak_profit_pct,
        trailing_active,
        peak_updated_at,
        consecutive_profit_ticks,
    }
}

fn update_peak(
    position: &Position,
    profit_pct: f64,
    now: DateTime<Utc>,
    t: &StrategyThresholds,
) -> (f64, bool, DateTime<Utc>, u32) {
    let (mut peak, mut peak_updated_at) = (position.peak_profit_pct, position.peak_updated_at);

    if profit_pct > peak {
        peak = profit_pct;
        peak_updated_at = now;
    } else {
        let elapsed = now.signed_duration_since(peak_updated_at).num_seconds();
        let periods = elapsed / PEAK_DECAY_PERIOD_SECS;
        if periods > 0 {
            peak *= (1.0 - PEAK_DECAY_RATE).powi(periods as i32);
            peak_updated_at += Duration::seconds(periods * PEAK_DECAY_PERIOD_SECS);
        }
    }

    let consecutive_profit_ticks = if profit_pct > 0.0 {
        position.consecutive_profit_ticks.saturating_add(1)
    } else {
        0
    };

    let trailing_active = position.trailing_active
        || (peak >= t.trail_activate && consecutive_profit_ticks >= 2);

    (peak, trailing_active, peak_updated_at, consecutive_profit_ticks)
}

fn take_profit_or_stop(t: &StrategyThresholds, profit_pct: f64, exit_price: f64) -> Option<ExitDecision> {
    if profit_pct >= t.tp {
        return Some(ExitDecision {
            reason: ExitReason::TakeProfit,
            exit_price,
            profit_pct,
        });
    }
    if profit_pct <= -t.sl {
        return Some(ExitDecision {
            reason: ExitReason::StopLoss,
            exit_price,
            profit_pct,
        });
    }
    None
}

fn trailing_stop(
    t: &StrategyThresholds,
    trailing_active: bool,
    profit_pct: f64,
    peak_profit_pct: f64,
    consecutive_profit_ticks: u32,
    exit_price: f64,
) -> Option<ExitDecision> {
    if trailing_active
        && profit_pct <= peak_profit_pct - t.trail_stop
        && consecutive_profit_ticks >= 2
    {
        Some(ExitDecision {
            reason: ExitReason::TrailingStop,
            exit_price,
            profit_pct,
        })
    } else {
        None
    }
}

fn breakeven_or_time(
    t: &StrategyThresholds,
    age: Duration,
    profit_pct: f64,
    exit_price: f64,
) -> Option<ExitDecision> {
    if age.num_seconds() >= t.be_sec && profit_pct.abs() < t.be_tol {
        return Some(ExitDecision {
            reason: ExitReason::Breakeven,
            exit_price,
            profit_pct,
        });
    }
    if age.num_seconds() >= t.time_sec {
        return Some(ExitDecision {
            reason: ExitReason::Time,
            exit_price,
            profit_pct,
        });
    }
    None
}
