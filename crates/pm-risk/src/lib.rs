//! Opening-discipline gate for C7's Broker. Grounded on the ordered
//! short-circuit predicate chain used by the teacher's own entry guard
//! (`hip3-bot::trade_loop` checks cooldown/concurrency/funds before ever
//! calling into the broker), generalized here to the nine-step chain.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use pm_core::{Decision, Signal, Strategy};

pub const Z_OPEN: f64 = 3.5;
pub const MID_MIN_FADE: f64 = 0.25;
pub const MID_MIN_TREND: f64 = 0.20;
pub const MID_MAX: f64 = 0.55;
pub const MAX_OPEN_POSITIONS: usize = 2;
pub const REARM_SECS: i64 = 300;
pub const REARM_EXPIRY_SECS: i64 = 3600;
pub const GLOBAL_COOLDOWN_SECS: i64 = 30;
pub const SIGNAL_MAX_AGE_SECS: i64 = 15;
pub const DELTA_RATIO_MIN: f64 = 0.015;
pub const DELTA_RATIO_MAX: f64 = 0.15;
pub const LOSS_COUNTER_BLOCK: u32 = 2;
pub const MIN_OPEN_CASH: f64 = 1.0;

/// Tracks slug -> last-closed instant so a just-closed market cannot be
/// immediately re-entered. Entries older than 3600s are pruned and treated
/// as never having closed.
#[derive(Default)]
pub struct RearmMap {
    last_closed: HashMap<String, DateTime<Utc>>,
}

impl RearmMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_close(&mut self, slug: &str, now: DateTime<Utc>) {
        self.last_closed.insert(slug.to_string(), now);
    }

    pub fn is_rearmed(&self, slug: &str, now: DateTime<Utc>) -> bool {
        match self.last_closed.get(slug) {
            None => true,
            Some(closed_at) => now.signed_duration_since(*closed_at) >= Duration::seconds(REARM_SECS),
        }
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = Duration::seconds(REARM_EXPIRY_SECS);
        self.last_closed
            .retain(|_, closed_at| now.signed_duration_since(*closed_at) < cutoff);
    }
}

/// Tracks slug -> consecutive losing-close count. A slug with count ≥ 2 is
/// blocked from opening until a winning close resets it.
#[derive(Default)]
pub struct LossCounters {
    counts: HashMap<String, u32>,
}

impl LossCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_loss(&mut self, slug: &str) {
        *self.counts.entry(slug.to_string()).or_insert(0) += 1;
    }

    pub fn record_win(&mut self, slug: &str) {
        self.counts.remove(slug);
    }

    pub fn is_blocked(&self, slug: &str) -> bool {
        self.counts.get(slug).copied().unwrap_or(0) >= LOSS_COUNTER_BLOCK
    }

    pub fn count(&self, slug: &str) -> u32 {
        self.counts.get(slug).copied().unwrap_or(0)
    }
}

/// Everything the gate needs to know about the Broker's current state.
/// Owned by the Trade Loop, which threads a fresh reference in on every
/// candidate signal.
pub struct OpeningContext<'a> {
    pub blocklist: &'a HashSet<String>,
    pub rearm: &'a RearmMap,
    pub loss_counters: &'a LossCounters,
    pub open_positions_count: usize,
    pub last_global_open: Option<DateTime<Utc>>,
    pub cash: f64,
}

/// Runs the nine-step opening-discipline chain against `signal` for the
/// given candidate `strategy`, short-circuiting on first failure.
pub fn evaluate_opening(
    signal: &Signal,
    strategy: Strategy,
    ctx: &OpeningContext<'_>,
    now: DateTime<Utc>,
) -> Decision {
    let reject = |reason: &str| Decision::Reject(reason.to_string());

    if signal.side.is_none() {
        return reject("no_side");
    }
    if ctx.blocklist.contains(&signal.slug) || ctx.loss_counters.is_blocked(&signal.slug) {
        return reject("blocked");
    }

    let mid_min = match strategy {
        Strategy::Fade => MID_MIN_FADE,
        Strategy::Trend => MID_MIN_TREND,
    };
    if !(mid_min..=MID_MAX).contains(&signal.mid) {
        return reject("mid_band");
    }

    if signal.abs_z < Z_OPEN {
        return reject("z_open");
    }

    if ctx.open_positions_count >= MAX_OPEN_POSITIONS {
        return reject("concurrency_cap");
    }

    if !ctx.rearm.is_rearmed(&signal.slug, now) {
        return reject("rearm_gate");
    }

    if let Some(last_open) = ctx.last_global_open {
        if now.signed_duration_since(last_open) < Duration::seconds(GLOBAL_COOLDOWN_SECS) {
            return reject("global_cooldown");
        }
    }

    let age = now.signed_duration_since(signal.created_at);
    if age >= Duration::seconds(SIGNAL_MAX_AGE_SECS) {
        return reject("stale_signal");
    }

    if signal.mid.abs() < 1e-12 {
        return reject("delta_ratio");
    }
    let delta_ratio = (signal.delta / signal.mid).abs();
    if !(DELTA_RATIO_MIN..=DELTA_RATIO_MAX).contains(&delta_ratio) {
        return reject("delta_ratio");
    }

    if ctx.cash < MIN_OPEN_CASH {
        return reject("insufficient_funds");
    }

    Decision::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::{Direction, GamePhase, Severity, Side};

    fn base_signal(now: DateTime<Utc>) -> Signal {
        Signal {
            slug: "game-1".to_string(),
            side: Some(Side::BuyNo),
            mid: 0.44,
            delta: 0.04,
            history_mean: 0.40,
            abs_z: 4.0,
            direction: Direction::Spike,
            direction_strength: 4.0,
            spread: 0.02,
            liquidity: 50.0,
            decision: Decision::Accept,
            strategy_hint: Some(Strategy::Fade),
            severity: Severity::Alert,
            game_phase: GamePhase::Live,
            burst_label: None,
            created_at: now,
        }
    }

    fn empty_ctx<'a>(
        blocklist: &'a HashSet<String>,
        rearm: &'a RearmMap,
        loss_counters: &'a LossCounters,
    ) -> OpeningContext<'a> {
        OpeningContext {
            blocklist,
            rearm,
            loss_counters,
            open_positions_count: 0,
            last_global_open: None,
            cash: 10.0,
        }
    }

    #[test]
    fn accepts_clean_signal() {
        let now = Utc::now();
        let signal = base_signal(now);
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Accept
        );
    }

    #[test]
    fn rejects_signal_age_exactly_15s() {
        let now = Utc::now();
        let mut signal = base_signal(now);
        signal.created_at = now - Duration::seconds(SIGNAL_MAX_AGE_SECS);
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("stale_signal".to_string())
        );
    }

    #[test]
    fn scenario_rearm_rejects_at_200s_admits_at_320s() {
        let t0 = Utc::now();
        let mut rearm = RearmMap::new();
        rearm.record_close("game-1", t0);

        let blocklist = HashSet::new();
        let losses = LossCounters::new();

        let t200 = t0 + Duration::seconds(200);
        let mut signal = base_signal(t200);
        signal.abs_z = 5.0;
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, t200),
            Decision::Reject("rearm_gate".to_string())
        );

        let t320 = t0 + Duration::seconds(320);
        signal.created_at = t320;
        let ctx2 = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx2, t320),
            Decision::Accept
        );
    }

    #[test]
    fn loss_counter_blocks_at_two() {
        let now = Utc::now();
        let signal = base_signal(now);
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let mut losses = LossCounters::new();
        losses.record_loss("game-1");
        losses.record_loss("game-1");
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("blocked".to_string())
        );
    }

    #[test]
    fn concurrency_cap_rejects_at_two_open() {
        let now = Utc::now();
        let signal = base_signal(now);
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let mut ctx = empty_ctx(&blocklist, &rearm, &losses);
        ctx.open_positions_count = 2;
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("concurrency_cap".to_string())
        );
    }

    #[test]
    fn mid_band_boundary_020_rejects_fade_accepts_trend() {
        let now = Utc::now();
        let mut signal = base_signal(now);
        signal.mid = 0.20;
        signal.delta = 0.003; // keep delta ratio in band for 0.20 mid
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("mid_band".to_string())
        );
        assert_eq!(
            evaluate_opening(&signal, Strategy::Trend, &ctx, now),
            Decision::Accept
        );
    }

    #[test]
    fn rejects_insufficient_funds() {
        let now = Utc::now();
        let signal = base_signal(now);
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let mut ctx = empty_ctx(&blocklist, &rearm, &losses);
        ctx.cash = 0.50;
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("insufficient_funds".to_string())
        );
    }

    #[test]
    fn rejects_delta_ratio_out_of_band() {
        let now = Utc::now();
        let mut signal = base_signal(now);
        signal.delta = 0.0001; // ratio far below 0.015
        let blocklist = HashSet::new();
        let rearm = RearmMap::new();
        let losses = LossCounters::new();
        let ctx = empty_ctx(&blocklist, &rearm, &losses);
        assert_eq!(
            evaluate_opening(&signal, Strategy::Fade, &ctx, now),
            Decision::Reject("delta_ratio".to_string())
        );
    }
}
