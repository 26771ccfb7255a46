//! Shared cash/position bookkeeping used by both `PaperBroker` and
//! `LiveBroker`. Grounded on the teacher's `hip3-position::tracker`
//! pattern of a single lock-guarded map plus atomic win/loss counters, but
//! collapsed into one struct since (unlike the teacher's handle/actor
//! split) nothing here crosses a task boundary on its own.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pm_core::{Decision, Side, Signal, Strategy};
use pm_persistence::{EventSink, TradeRecord};
use pm_position::Position;
use pm_risk::{LossCounters, OpeningContext, RearmMap};

pub const FEE_RATE: f64 = 0.005;
pub const MIN_OPEN_CASH: f64 = 1.0;
pub const MAX_OPEN_CASH: f64 = 10.0;
pub const EQUITY_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerStatus {
    pub cash: f64,
    pub locked: f64,
    pub unrealized: f64,
    pub realized: f64,
    pub wins: u32,
    pub losses: u32,
    pub open_count: usize,
}

/// `per-trade cash = clamp(equity * 0.10, $1, $10)`.
pub fn size_cash(equity: f64) -> f64 {
    (equity * EQUITY_FRACTION).clamp(MIN_OPEN_CASH, MAX_OPEN_CASH)
}

pub fn fee(notional: f64) -> f64 {
    notional * FEE_RATE
}

pub struct BrokerCore {
    pub(crate) cash: Mutex<f64>,
    pub(crate) positions: Mutex<HashMap<String, Position>>,
    pub(crate) rearm: Mutex<RearmMap>,
    pub(crate) loss_counters: Mutex<LossCounters>,
    pub(crate) last_global_open: Mutex<Option<DateTime<Utc>>>,
    pub(crate) realized_pnl: Mutex<f64>,
    pub(crate) wins: AtomicU32,
    pub(crate) losses: AtomicU32,
    pub(crate) sink: Option<EventSink>,
    pub(crate) blocklist: HashSet<String>,
}

impl BrokerCore {
    pub fn new(initial_cash: f64, sink: Option<EventSink>) -> Self {
        Self::with_blocklist(initial_cash, sink, HashSet::new())
    }

    pub fn with_blocklist(
        initial_cash: f64,
        sink: Option<EventSink>,
        blocklist: HashSet<String>,
    ) -> Self {
        Self {
            cash: Mutex::new(initial_cash),
            positions: Mutex::new(HashMap::new()),
            rearm: Mutex::new(RearmMap::new()),
            loss_counters: Mutex::new(LossCounters::new()),
            last_global_open: Mutex::new(None),
            realized_pnl: Mutex::new(0.0),
            wins: AtomicU32::new(0),
            losses: AtomicU32::new(0),
            sink,
            blocklist,
        }
    }

    pub fn cash(&self) -> f64 {
        *self.cash.lock()
    }

    pub fn set_cash(&self, value: f64) {
        *self.cash.lock() = value;
    }

    pub fn equity(&self) -> f64 {
        let locked: f64 = self.positions.lock().values().map(|p| p.cost_basis).sum();
        self.cash() + locked
    }

    pub fn open_positions_count(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn has_position(&self, slug: &str) -> bool {
        self.positions.lock().contains_key(slug)
    }

    pub fn insert_position(&self, position: Position, now: DateTime<Utc>) {
        *self.last_global_open.lock() = Some(now);
        self.positions.lock().insert(position.slug.clone(), position);
    }

    pub fn remove_position(&self, slug: &str) -> Option<Position> {
        self.positions.lock().remove(slug)
    }

    pub fn update_position(&self, position: Position) {
        self.positions.lock().insert(position.slug.clone(), position);
    }

    pub fn snapshot_position(&self, slug: &str) -> Option<Position> {
        self.positions.lock().get(slug).cloned()
    }

    pub fn open_slugs(&self) -> Vec<String> {
        self.positions.lock().keys().cloned().collect()
    }

    pub fn record_close_outcome(&self, slug: &str, pnl: f64, now: DateTime<Utc>) {
        *self.realized_pnl.lock() += pnl;
        self.rearm.lock().record_close(slug, now);
        if pnl > 0.0 {
            self.wins.fetch_add(1, Ordering::Relaxed);
            self.loss_counters.lock().record_win(slug);
        } else {
            self.losses.fetch_add(1, Ordering::Relaxed);
            self.loss_counters.lock().record_loss(slug);
        }
    }

    pub fn cleanup(&self, now: DateTime<Utc>) {
        self.rearm.lock().prune(now);
    }

    /// Runs the nine-step opening-discipline chain against the Broker's
    /// own state (positions, rearm map, loss counters, cash).
    pub fn evaluate_opening(&self, signal: &Signal, strategy: Strategy, now: DateTime<Utc>) -> Decision {
        let rearm = self.rearm.lock();
        let loss_counters = self.loss_counters.lock();
        let ctx = OpeningContext {
            blocklist: &self.blocklist,
            rearm: &rearm,
            loss_counters: &loss_counters,
            open_positions_count: self.open_positions_count(),
            last_global_open: *self.last_global_open.lock(),
            cash: self.cash(),
        };
        pm_risk::evaluate_opening(signal, strategy, &ctx, now)
    }

    pub fn status(&self) -> BrokerStatus {
        let positions = self.positions.lock();
        let locked: f64 = positions.values().map(|p| p.cost_basis).sum();
        BrokerStatus {
            cash: self.cash(),
            locked,
            unrealized: 0.0,
            realized: *self.realized_pnl.lock(),
            wins: self.wins.load(Ordering::Relaxed),
            losses: self.losses.load(Ordering::Relaxed),
            open_count: positions.len(),
        }
    }

    pub fn log_open(
        &self,
        slug: &str,
        side: Side,
        qty: f64,
        entry_mid: f64,
        fee_open: f64,
        z_score: f64,
        strategy: Strategy,
        now: DateTime<Utc>,
    ) {
        if let Some(sink) = &self.sink {
            sink.write_trade_event(TradeRecord {
                timestamp: now,
                event: "OPEN",
                slug: slug.to_string(),
                side: side.to_string(),
                qty,
                entry_mid,
                exit_mid: None,
                pnl: None,
                cash_after: self.cash(),
                reason: None,
                fee: fee_open,
                z_score,
                strategy: strategy.to_string(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_close(
        &self,
        position: &Position,
        exit_price: f64,
        pnl: f64,
        fee_close: f64,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        if let Some(sink) = &self.sink {
            sink.write_trade_event(TradeRecord {
                timestamp: now,
                event: "CLOSE",
                slug: position.slug.clone(),
                side: position.side.to_string(),
                qty: position.qty,
                entry_mid: position.entry_mid,
                exit_mid: Some(exit_price),
                pnl: Some(pnl),
                cash_after: self.cash(),
                reason: Some(reason.to_string()),
                fee: fee_close,
                z_score: position.z_score,
                strategy: position.strategy.to_string(),
            });
        }
    }
}

/// Gross P&L on one unit-cost round trip, signed so a favorable move is
/// positive for either side (see `Side::unit_cost`).
pub fn pnl_gross(side: Side, entry_mid: f64, exit_price: f64, qty: f64) -> f64 {
    let entry_unit_cost = side.unit_cost(entry_mid);
    let exit_unit_cost = side.unit_cost(exit_price);
    qty * (exit_unit_cost - entry_unit_cost)
}
