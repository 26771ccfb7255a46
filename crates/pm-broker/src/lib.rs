//! C7 Broker: owns cash + the open-positions map, behind one capability
//! with two I/O strategies. Per spec.md §9 ("Paper vs Live as two classes
//! with duplicated logic... model as one abstract Broker capability and
//! two implementations"), `BrokerCore` carries every bit of state and
//! discipline-gate logic that doesn't differ between the two, and
//! `Broker` is a thin enum dispatch over `PaperBroker`/`LiveBroker` so the
//! Trade Loop (C9) never needs to know which variant it holds.
//!
//! Enum dispatch (not a boxed trait) because neither variant needs to be
//! swapped at runtime and this workspace carries no `async-trait`
//! dependency; the teacher's own `hip3-executor` reaches for match-on-enum
//! dispatch over boxed-trait-object async wherever the same holds.

pub mod core;
pub mod error;
pub mod live;
pub mod paper;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pm_core::{Signal, Strategy};
use pm_exchange::ExchangeClient;
use pm_persistence::EventSink;
use pm_position::Position;
use pm_state::MarketStateStore;

pub use crate::core::{fee, pnl_gross, size_cash, BrokerCore, BrokerStatus};
pub use crate::error::{BrokerError, Result};
pub use crate::live::LiveBroker;
pub use crate::paper::PaperBroker;

/// The Broker capability: sizing, opening discipline, the five exit
/// rules' executable-price observation, and the OPEN/CLOSE trade-log
/// contract, behind whichever I/O strategy the deployment picked.
pub enum Broker {
    Paper(PaperBroker),
    Live(LiveBroker),
}

impl Broker {
    pub fn paper(initial_cash: f64, sink: Option<EventSink>, state: Arc<MarketStateStore>) -> Self {
        Broker::Paper(PaperBroker::new(BrokerCore::new(initial_cash, sink), state))
    }

    pub fn live(
        initial_cash: f64,
        sink: Option<EventSink>,
        client: Arc<ExchangeClient>,
        state: Arc<MarketStateStore>,
    ) -> Self {
        Broker::Live(LiveBroker::new(BrokerCore::new(initial_cash, sink), client, state))
    }

    pub async fn open(&self, signal: &Signal, strategy: Strategy, now: DateTime<Utc>) -> Option<Position> {
        match self {
            Broker::Paper(b) => b.open(signal, strategy, now).await,
            Broker::Live(b) => b.open(signal, strategy, now).await,
        }
    }

    pub async fn close(&self, slug: &str, reason: &str, now: DateTime<Utc>) -> Option<(Position, f64)> {
        match self {
            Broker::Paper(b) => b.close(slug, reason, now).await,
            Broker::Live(b) => b.close(slug, reason, now).await,
        }
    }

    /// Best-bid for a YES-long, best-ask for a NO-long — never the mid.
    /// The Exit Evaluator (C8) is a pure free function; this is the one
    /// Broker observation it takes as input (spec.md §9).
    pub fn get_current_executable_exit(&self, position: &Position) -> f64 {
        match self {
            Broker::Paper(b) => b.get_current_executable_exit(position),
            Broker::Live(b) => b.get_current_executable_exit(position),
        }
    }

    pub fn cleanup(&self, now: DateTime<Utc>) {
        match self {
            Broker::Paper(b) => b.cleanup(now),
            Broker::Live(b) => b.cleanup(now),
        }
    }

    pub fn status(&self) -> BrokerStatus {
        match self {
            Broker::Paper(b) => b.status(),
            Broker::Live(b) => b.status(),
        }
    }

    pub fn has_position(&self, slug: &str) -> bool {
        match self {
            Broker::Paper(b) => b.has_position(slug),
            Broker::Live(b) => b.has_position(slug),
        }
    }

    pub fn open_slugs(&self) -> Vec<String> {
        match self {
            Broker::Paper(b) => b.open_slugs(),
            Broker::Live(b) => b.open_slugs(),
        }
    }

    pub fn snapshot_position(&self, slug: &str) -> Option<Position> {
        match self {
            Broker::Paper(b) => b.snapshot_position(slug),
            Broker::Live(b) => b.snapshot_position(slug),
        }
    }

    pub fn update_position(&self, position: Position) {
        match self {
            Broker::Paper(b) => b.update_position(position),
            Broker::Live(b) => b.update_position(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::{Decision, Direction, GamePhase, Severity, Side};

    fn signal(slug: &str, mid: f64, abs_z: f64, now: DateTime<Utc>) -> Signal {
        Signal {
            slug: slug.to_string(),
            side: Some(Side::BuyNo),
            mid,
            delta: 0.04,
            history_mean: mid - 0.04,
            abs_z,
            direction: Direction::Spike,
            direction_strength: abs_z,
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

    #[test]
    fn enum_dispatch_opens_and_closes_through_paper_variant() {
        tokio_test::block_on(async {
            let now = Utc::now();
            let state = Arc::new(MarketStateStore::new());
            let broker = Broker::paper(100.0, None, state.clone());

            let sig = signal("game-1", 0.44, 4.0, now);
            let position = broker.open(&sig, Strategy::Fade, now).await.unwrap();
            assert_eq!(position.slug, "game-1");
            assert!(broker.has_position("game-1"));
            assert_eq!(broker.open_slugs(), vec!["game-1".to_string()]);

            state
                .ingest(&pm_core::BboSample {
                    slug: "game-1".to_string(),
                    best_bid: 0.37,
                    best_ask: 0.39,
                    open_interest: 0.0,
                    state: pm_core::MarketState::Open,
                    received_at: now,
                })
                .unwrap();

            let (closed, pnl) = broker
                .close("game-1", "tp", now + chrono::Duration::seconds(10))
                .await
                .unwrap();
            assert_eq!(closed.slug, "game-1");
            assert!(pnl > 0.0);
            assert!(!broker.has_position("game-1"));
            assert_eq!(broker.status().wins, 1);
        });
    }
}
