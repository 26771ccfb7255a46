//! Sliding-window call-rate ceiling: R calls per W seconds (spec.md §4.2:
//! R=40, W=1s). Directly adapted from the teacher's
//! `hip3-ws::rate_limiter::RateLimiter` token-bucket-by-timestamps shape,
//! generalized from a fixed message budget to an `acquire().await` call
//! made at the top of every REST method (spec.md §9: "decorator-based rate
//! limiting... becomes an explicit call").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window_secs: u64) -> Self {
        Self {
            max_calls,
            window: Duration::from_secs(window_secs),
            timestamps: Mutex::new(VecDeque::with_capacity(max_calls as usize)),
        }
    }

    fn cleanup(&self) {
        let cutoff = Instant::now() - self.window;
        let mut ts = self.timestamps.lock();
        while ts.front().is_some_and(|&t| t < cutoff) {
            ts.pop_front();
        }
    }

    fn can_send(&self) -> bool {
        self.cleanup();
        self.timestamps.lock().len() < self.max_calls as usize
    }

    fn record(&self) {
        self.cleanup();
        let mut ts = self.timestamps.lock();
        ts.push_back(Instant::now());
        if ts.len() >= self.max_calls as usize {
            warn!(count = ts.len(), max = self.max_calls, "approaching rate limit");
        }
    }

    /// Blocks until a slot opens, then records the call. This blocking is
    /// the system's sole back-pressure mechanism for the exchange client.
    pub async fn acquire(&self) {
        while !self.can_send() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.record();
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.cleanup();
        self.max_calls
            .saturating_sub(self.timestamps.lock().len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_admits_up_to_max() {
        let rl = RateLimiter::new(3, 60);
        for _ in 0..3 {
            rl.acquire().await;
        }
        assert_eq!(rl.remaining_capacity(), 0);
    }

    #[test]
    fn window_evicts_old_timestamps() {
        let rl = RateLimiter::new(5, 60);
        rl.timestamps
            .lock()
            .push_back(Instant::now() - Duration::from_secs(61));
        assert_eq!(rl.remaining_capacity(), 5);
    }
}
