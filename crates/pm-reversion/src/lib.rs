//! C6 Reversion Tracker: records post-spike outcomes at a fixed future
//! horizon and computes rolling reversion/continuation rates. The bounded,
//! pruned `VecDeque` behind a single mutex mirrors the teacher's cross-
//! market tracker shape (a bounded window pruned on every poll), adapted
//! from dislocation-cross tracking to spike-outcome tracking.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub const CHECK_HORIZON_SECS: i64 = 180;
pub const RETENTION_SECS: i64 = 600;
pub const REVERTED_FRACTION: f64 = 0.50;
pub const CONTINUED_FRACTION: f64 = 0.20;
const MIN_CHECKED_FOR_RATE: usize = 3;

#[derive(Debug, Clone)]
pub struct SpikeRecord {
    pub time: DateTime<Utc>,
    pub slug: String,
    pub spike_mid: f64,
    pub pre_mean: f64,
    pub z_score: f64,
    pub spread: f64,
    pub fade_eligible: bool,
    pub trend_eligible: bool,
    pub checked: bool,
    pub reverted: bool,
    pub continued: bool,
    pub check_mid: Option<f64>,
}

impl SpikeRecord {
    fn new(
        now: DateTime<Utc>,
        slug: String,
        spike_mid: f64,
        pre_mean: f64,
        z_score: f64,
        spread: f64,
        fade_eligible: bool,
        trend_eligible: bool,
    ) -> Self {
        Self {
            time: now,
            slug,
            spike_mid,
            pre_mean,
            z_score,
            spread,
            fade_eligible,
            trend_eligible,
            checked: false,
            reverted: false,
            continued: false,
            check_mid: None,
        }
    }
}

pub struct ReversionTracker {
    records: Mutex<VecDeque<SpikeRecord>>,
}

impl Default for ReversionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReversionTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_spike(
        &self,
        now: DateTime<Utc>,
        slug: &str,
        spike_mid: f64,
        pre_mean: f64,
        z_score: f64,
        spread: f64,
        fade_eligible: bool,
        trend_eligible: bool,
    ) {
        let record = SpikeRecord::new(
            now,
            slug.to_string(),
            spike_mid,
            pre_mean,
            z_score,
            spread,
            fade_eligible,
            trend_eligible,
        );
        self.records.lock().push_back(record);
    }

    /// Resolves every unresolved record whose age has reached the 180s
    /// horizon, using `mid_lookup` for the current mid of its slug.
    /// Prunes anything older than the 600s retention window. Returns the
    /// records resolved on this call so callers can log them without
    /// re-querying.
    pub fn resolve_due<F>(&self, now: DateTime<Utc>, mut mid_lookup: F) -> Vec<SpikeRecord>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut records = self.records.lock();
        let mut resolved = Vec::new();

        for record in records.iter_mut() {
            if record.checked {
                continue;
            }
            let age = now.signed_duration_since(record.time);
            if age < Duration::seconds(CHECK_HORIZON_SECS) {
                continue;
            }
            if let Some(current_mid) = mid_lookup(&record.slug) {
                let spike_deviation = record.spike_mid - record.pre_mean;
                let current_deviation = current_mid - record.pre_mean;
                let reversion_fraction = if spike_deviation.abs() < 1e-12 {
                    0.0
                } else {
                    (spike_deviation - current_deviation) / spike_deviation
                };
                record.check_mid = Some(current_mid);
                record.reverted = reversion_fraction >= REVERTED_FRACTION;
                record.continued = reversion_fraction < CONTINUED_FRACTION;
                record.checked = true;
                resolved.push(record.clone());
            }
        }

        let cutoff = now - Duration::seconds(RETENTION_SECS);
        while records.front().is_some_and(|r| r.time < cutoff) {
            records.pop_front();
        }

        resolved
    }

    /// Fraction of checked, FADE-eligible records (within the retention
    /// window) that reverted. `None` ("neutral") below 3 checked records.
    pub fn reversion_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        self.rate(now, |r| r.fade_eligible, |r| r.reverted)
    }

    /// Fraction of checked, TREND-eligible records that continued.
    pub fn continuation_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        self.rate(now, |r| r.trend_eligible, |r| r.continued)
    }

    fn rate(
        &self,
        now: DateTime<Utc>,
        eligible: impl Fn(&SpikeRecord) -> bool,
        outcome: impl Fn(&SpikeRecord) -> bool,
    ) -> Option<f64> {
        let cutoff = now - Duration::seconds(RETENTION_SECS);
        let records = self.records.lock();
        let relevant: Vec<&SpikeRecord> = records
            .iter()
            .filter(|r| r.checked && r.time >= cutoff && eligible(r))
            .collect();
        if relevant.len() < MIN_CHECKED_FOR_RATE {
            return None;
        }
        let hits = relevant.iter().filter(|r| outcome(r)).count();
        Some(hits as f64 / relevant.len() as f64)
    }

    pub fn checked_count(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(RETENTION_SECS);
        self.records
            .lock()
            .iter()
            .filter(|r| r.checked && r.time >= cutoff)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversion_fraction_exactly_half_counts_as_reverted() {
        let tracker = ReversionTracker::new();
        let t0 = Utc::now() - Duration::seconds(CHECK_HORIZON_SECS);
        tracker.record_spike(t0, "g1", 0.50, 0.40, 4.0, 0.02, true, false);
        // spike_deviation = 0.10, current_deviation = 0.05 -> fraction 0.50
        let resolved = tracker.resolve_due(Utc::now(), |_| Some(0.45));
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].reverted);
    }

    #[test]
    fn continuation_below_020_marks_continued() {
        let tracker = ReversionTracker::new();
        let t0 = Utc::now() - Duration::seconds(CHECK_HORIZON_SECS);
        tracker.record_spike(t0, "g1", 0.50, 0.40, 4.0, 0.02, false, true);
        // spike_deviation = 0.10, current_deviation = 0.095 -> fraction 0.05
        let resolved = tracker.resolve_due(Utc::now(), |_| Some(0.495));
        assert!(resolved[0].continued);
        assert!(!resolved[0].reverted);
    }

    #[test]
    fn does_not_resolve_before_horizon() {
        let tracker = ReversionTracker::new();
        tracker.record_spike(Utc::now(), "g1", 0.50, 0.40, 4.0, 0.02, true, false);
        let resolved = tracker.resolve_due(Utc::now(), |_| Some(0.45));
        assert!(resolved.is_empty());
    }

    #[test]
    fn rate_requires_at_least_three_checked() {
        let tracker = ReversionTracker::new();
        let t0 = Utc::now() - Duration::seconds(CHECK_HORIZON_SECS);
        for _ in 0..2 {
            tracker.record_spike(t0, "g1", 0.50, 0.40, 4.0, 0.02, true, false);
        }
        tracker.resolve_due(Utc::now(), |_| Some(0.20));
        assert_eq!(tracker.reversion_rate(Utc::now()), None);
    }

    #[test]
    fn rate_computed_once_enough_checked() {
        let tracker = ReversionTracker::new();
        let t0 = Utc::now() - Duration::seconds(CHECK_HORIZON_SECS);
        for _ in 0..3 {
            tracker.record_spike(t0, "g1", 0.50, 0.40, 4.0, 0.02, true, false);
        }
        tracker.resolve_due(Utc::now(), |_| Some(0.20)); // full reversion
        let rate = tracker.reversion_rate(Utc::now()).unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn old_records_pruned_on_resolve() {
        let tracker = ReversionTracker::new();
        let old = Utc::now() - Duration::seconds(RETENTION_SECS + 10);
        tracker.record_spike(old, "g1", 0.50, 0.40, 4.0, 0.02, true, false);
        tracker.resolve_due(Utc::now(), |_| Some(0.45));
        assert_eq!(tracker.records.lock().len(), 0);
    }
}
