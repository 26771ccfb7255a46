//! Ping/pong liveness tracking: ping every 30s, fail the connection if no
//! pong (or any message) arrives within 10s of the ping, per spec.md §4.3.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    last_message: RwLock<Instant>,
    last_ping_sent: RwLock<Option<Instant>>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            last_message: RwLock::new(Instant::now()),
            last_ping_sent: RwLock::new(None),
        }
    }

    pub fn reset(&self) {
        *self.last_message.write() = Instant::now();
        *self.last_ping_sent.write() = None;
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Instant::now();
    }

    pub fn record_pong(&self) {
        self.record_message();
        *self.last_ping_sent.write() = None;
    }

    pub fn record_ping(&self) {
        *self.last_ping_sent.write() = Some(Instant::now());
    }

    pub fn should_send_ping(&self) -> bool {
        self.last_ping_sent.read().is_none() && self.last_message.read().elapsed() >= self.interval
    }

    pub fn is_timed_out(&self) -> bool {
        match *self.last_ping_sent.read() {
            Some(sent) => sent.elapsed() >= self.timeout,
            None => false,
        }
    }

    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_manager_has_no_timeout() {
        let hb = HeartbeatManager::new(30_000, 10_000);
        assert!(!hb.is_timed_out());
        assert!(!hb.should_send_ping());
    }
}
