//! C4 Market State Store: per-slug mid/spread history plus the process-wide
//! Global Delta Series. Grounded on the teacher's choice of concurrency
//! primitive (`DashMap`, as used by `hip3-position::tracker`'s lookup
//! cache) but *not* its actor/handle indirection — this store has no
//! cross-task consistency requirement beyond what a per-entry lock already
//! gives, so reads and writes go straight through `DashMap`/`parking_lot`
//! (divergence recorded in DESIGN.md).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use pm_core::{BboSample, Result};

pub const HISTORY_CAPACITY: usize = 50;
pub const SPREAD_RING_CAPACITY: usize = 10;
pub const GLOBAL_DELTA_CAPACITY: usize = 2000;
pub const MAX_SPREAD_PCT: f64 = 0.15;
const PEAK_Z_STALE_SECS: i64 = 60;
const PEAK_Z_DECAY_PER_PERIOD: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub slug: String,
    pub mid_history: VecDeque<f64>,
    pub last_mid: f64,
    pub last_bid: f64,
    pub last_ask: f64,
    pub last_spread: f64,
    pub spread_history: VecDeque<f64>,
    pub open_interest: f64,
    pub peak_z: f64,
    pub peak_z_updated_at: DateTime<Utc>,
    /// Carried for data-model fidelity with spec.md §3; the Exit
    /// Evaluator's consecutive-profit counter lives on `Position`, not
    /// here — this field has no reader in this implementation.
    pub consecutive_profit_ticks: u32,
    pub last_update: DateTime<Utc>,
}

impl MarketSnapshot {
    fn new(slug: String, now: DateTime<Utc>) -> Self {
        Self {
            slug,
            mid_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            last_mid: 0.0,
            last_bid: 0.0,
            last_ask: 0.0,
            last_spread: 0.0,
            spread_history: VecDeque::with_capacity(SPREAD_RING_CAPACITY),
            open_interest: 0.0,
            peak_z: 0.0,
            peak_z_updated_at: now,
            consecutive_profit_ticks: 0,
            last_update: now,
        }
    }
}

pub struct IngestResult {
    pub mid: f64,
    pub spread: f64,
    pub delta: f64,
    /// False when `spread > MAX_SPREAD_PCT`: the mid cache was still
    /// updated but the signal pipeline must not advance this tick
    /// (spec.md §4.4 step 2).
    pub pipeline_gate: bool,
    pub history: Vec<f64>,
    pub open_interest_delta: f64,
}

pub struct MarketStateStore {
    markets: DashMap<String, MarketSnapshot>,
    global_deltas: Mutex<VecDeque<f64>>,
}

impl Default for MarketStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStateStore {
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
            global_deltas: Mutex::new(VecDeque::with_capacity(GLOBAL_DELTA_CAPACITY)),
        }
    }

    /// Folds one BBO sample into the store per spec.md §4.4 steps 1-4 and
    /// 6. Step 5 (peak-z decay/replace) is applied separately via
    /// `update_peak_z` once the caller (the Signal Engine) has computed
    /// the new z-score from the history this call returns.
    pub fn ingest(&self, sample: &BboSample) -> Result<IngestResult> {
        let mid = sample.mid()?;
        let spread = sample.spread();
        let now = sample.received_at;

        let mut entry = self
            .markets
            .entry(sample.slug.clone())
            .or_insert_with(|| MarketSnapshot::new(sample.slug.clone(), now));

        let prev_mid = if entry.mid_history.is_empty() {
            mid
        } else {
            entry.last_mid
        };
        let delta = mid - prev_mid;
        let open_interest_delta = sample.open_interest - entry.open_interest;

        if entry.mid_history.len() >= HISTORY_CAPACITY {
            entry.mid_history.pop_front();
        }
        entry.mid_history.push_back(mid);

        if entry.spread_history.len() >= SPREAD_RING_CAPACITY {
            entry.spread_history.pop_front();
        }
        entry.spread_history.push_back(spread);

        entry.last_mid = mid;
        entry.last_bid = sample.best_bid;
        entry.last_ask = sample.best_ask;
        entry.last_spread = spread;
        entry.open_interest = sample.open_interest;
        entry.last_update = now;

        let history = entry.mid_history.iter().copied().collect::<Vec<_>>();
        drop(entry);

        {
            let mut deltas = self.global_deltas.lock();
            if deltas.len() >= GLOBAL_DELTA_CAPACITY {
                deltas.pop_front();
            }
            deltas.push_back(delta.abs());
        }

        Ok(IngestResult {
            mid,
            spread,
            delta,
            pipeline_gate: spread <= MAX_SPREAD_PCT,
            history,
            open_interest_delta,
        })
    }

    /// Step 5: replace the stored peak if the new `|z|` exceeds it or the
    /// stored peak is older than 60s; otherwise decay it 25% per 60s
    /// elapsed. Peak-z is monotonically non-increasing between arrivals.
    pub fn update_peak_z(&self, slug: &str, z: f64, now: DateTime<Utc>) {
        if let Some(mut entry) = self.markets.get_mut(slug) {
            let abs_z = z.abs();
            let age = now.signed_duration_since(entry.peak_z_updated_at);
            if abs_z > entry.peak_z.abs() || age.num_seconds() >= PEAK_Z_STALE_SECS {
                entry.peak_z = abs_z;
                entry.peak_z_updated_at = now;
            } else {
                let periods = age.num_seconds() as f64 / PEAK_Z_STALE_SECS as f64;
                if periods > 0.0 {
                    entry.peak_z *= (1.0 - PEAK_Z_DECAY_PER_PERIOD).powf(periods);
                }
            }
        }
    }

    pub fn snapshot(&self, slug: &str) -> Option<MarketSnapshot> {
        self.markets.get(slug).map(|e| e.clone())
    }

    /// Every tracked market's snapshot, for consumers that sweep the
    /// whole store on a tick (the Scanner) rather than looking up one slug.
    pub fn snapshots(&self) -> Vec<MarketSnapshot> {
        self.markets.iter().map(|e| e.clone()).collect()
    }

    pub fn remove(&self, slug: &str) {
        self.markets.remove(slug);
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn global_deltas(&self) -> Vec<f64> {
        self.global_deltas.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::MarketState as CoreMarketState;

    fn sample(slug: &str, bid: f64, ask: f64) -> BboSample {
        BboSample {
            slug: slug.to_string(),
            best_bid: bid,
            best_ask: ask,
            open_interest: 100.0,
            state: CoreMarketState::Open,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_invalid_mid() {
        let store = MarketStateStore::new();
        let s = sample("x", 0.6, 0.5);
        assert!(store.ingest(&s).is_err());
    }

    #[test]
    fn wide_spread_still_updates_cache_but_gates_pipeline() {
        let store = MarketStateStore::new();
        let s = sample("x", 0.2, 0.5); // spread 0.30 > 0.15
        let result = store.ingest(&s).unwrap();
        assert!(!result.pipeline_gate);
        assert_eq!(store.snapshot("x").unwrap().mid_history.len(), 1);
    }

    #[test]
    fn history_evicts_at_capacity() {
        let store = MarketStateStore::new();
        for i in 0..60 {
            let mid = 0.3 + (i as f64) * 0.0001;
            let s = sample("x", mid - 0.01, mid + 0.01);
            store.ingest(&s).unwrap();
        }
        assert_eq!(
            store.snapshot("x").unwrap().mid_history.len(),
            HISTORY_CAPACITY
        );
    }

    #[test]
    fn global_delta_series_capped() {
        let store = MarketStateStore::new();
        for i in 0..(GLOBAL_DELTA_CAPACITY + 50) {
            let mid = 0.3 + (i as f64) * 0.00001;
            let s = sample("x", mid - 0.01, mid + 0.01);
            store.ingest(&s).unwrap();
        }
        assert_eq!(store.global_deltas().len(), GLOBAL_DELTA_CAPACITY);
    }

    #[test]
    fn peak_z_replaces_when_larger() {
        let store = MarketStateStore::new();
        store.ingest(&sample("x", 0.3, 0.32)).unwrap();
        let t0 = Utc::now();
        store.update_peak_z("x", 2.0, t0);
        assert_eq!(store.snapshot("x").unwrap().peak_z, 2.0);
        store.update_peak_z("x", 1.0, t0 + chrono::Duration::seconds(5));
        // smaller z, not stale yet -> decays rather than replaces
        assert!(store.snapshot("x").unwrap().peak_z < 2.0);
        assert!(store.snapshot("x").unwrap().peak_z > 1.0);
    }

    #[test]
    fn peak_z_replaces_when_stale() {
        let store = MarketStateStore::new();
        store.ingest(&sample("x", 0.3, 0.32)).unwrap();
        let t0 = Utc::now();
        store.update_peak_z("x", 5.0, t0);
        store.update_peak_z("x", 1.0, t0 + chrono::Duration::seconds(61));
        assert_eq!(store.snapshot("x").unwrap().peak_z, 1.0);
    }

    #[test]
    fn remove_drops_entry() {
        let store = MarketStateStore::new();
        store.ingest(&sample("x", 0.3, 0.32)).unwrap();
        assert!(store.snapshot("x").is_some());
        store.remove("x");
        assert!(store.snapshot("x").is_none());
    }
}
