//! Paper variant: simulates fills at the observed mid, same discipline and
//! fee schedule as the live path, no network effects.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pm_core::{Decision, Side, Signal, Strategy};
use pm_position::Position;
use pm_state::MarketStateStore;

use crate::core::{fee, pnl_gross, size_cash, BrokerCore, BrokerStatus};

pub struct PaperBroker {
    core: BrokerCore,
    state: Arc<MarketStateStore>,
}

impl PaperBroker {
    pub fn new(core: BrokerCore, state: Arc<MarketStateStore>) -> Self {
        Self { core, state }
    }

    pub async fn open(&self, signal: &Signal, strategy: Strategy, now: DateTime<Utc>) -> Option<Position> {
        if self.core.evaluate_opening(signal, strategy, now) != Decision::Accept {
            return None;
        }
        let side = signal.side?;
        let unit_cost = side.unit_cost(signal.mid);
        if unit_cost <= 0.0 {
            return None;
        }

        let cash_size = size_cash(self.core.equity());
        let fee_open = fee(cash_size);
        let notional = cash_size - fee_open;
        let qty = notional / unit_cost;

        *self.core.cash.lock() -= cash_size;

        let position = Position {
            slug: signal.slug.clone(),
            side,
            qty,
            entry_mid: signal.mid,
            entry_time: now,
            fill_price: signal.mid,
            cost_basis: cash_size,
            fee_open,
            z_score: signal.abs_z,
            peak_profit_pct: 0.0,
            trailing_active: false,
            peak_updated_at: now,
            consecutive_profit_ticks: 0,
            strategy,
            order_id: None,
        };

        self.core.insert_position(position.clone(), now);
        self.core
            .log_open(&position.slug, side, qty, signal.mid, fee_open, signal.abs_z, strategy, now);
        Some(position)
    }

    pub async fn close(&self, slug: &str, reason: &str, now: DateTime<Utc>) -> Option<(Position, f64)> {
        let position = self.core.snapshot_position(slug)?;
        let exit_price = self.get_current_executable_exit(&position);

        let gross = pnl_gross(position.side, position.entry_mid, exit_price, position.qty);
        let exit_notional = position.qty * position.side.unit_cost(exit_price);
        let fee_close = fee(exit_notional);
        let pnl = gross - fee_close;

        *self.core.cash.lock() += exit_notional - fee_close;
        self.core.remove_position(slug);
        self.core.record_close_outcome(slug, pnl, now);
        self.core.log_close(&position, exit_price, pnl, fee_close, reason, now);

        Some((position, pnl))
    }

    /// Best-bid for a YES-long, best-ask for a NO-long — never the mid.
    pub fn get_current_executable_exit(&self, position: &Position) -> f64 {
        match self.state.snapshot(&position.slug) {
            Some(snap) => match position.side {
                Side::BuyYes => snap.last_bid,
                Side::BuyNo => snap.last_ask,
            },
            None => position.entry_mid,
        }
    }

    pub fn cleanup(&self, now: DateTime<Utc>) {
        self.core.cleanup(now);
    }

    pub fn status(&self) -> BrokerStatus {
        self.core.status()
    }

    pub fn has_position(&self, slug: &str) -> bool {
        self.core.has_position(slug)
    }

    pub fn open_slugs(&self) -> Vec<String> {
        self.core.open_slugs()
    }

    pub fn snapshot_position(&self, slug: &str) -> Option<Position> {
        self.core.snapshot_position(slug)
    }

    pub fn update_position(&self, position: Position) {
        self.core.update_position(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::{Direction, GamePhase, Severity};

    fn signal(slug: &str, mid: f64, delta: f64, abs_z: f64, now: DateTime<Utc>, strategy_hint: Strategy) -> Signal {
        Signal {
            slug: slug.to_string(),
            side: Some(match strategy_hint {
                Strategy::Fade => Side::BuyNo,
                Strategy::Trend => Side::BuyYes,
            }),
            mid,
            delta,
            history_mean: mid - delta,
            abs_z,
            direction: Direction::from_delta(delta),
            direction_strength: abs_z,
            spread: 0.02,
            liquidity: 50.0,
            decision: Decision::Accept,
            strategy_hint: Some(strategy_hint),
            severity: Severity::Alert,
            game_phase: GamePhase::Live,
            burst_label: None,
            created_at: now,
        }
    }

    #[test]
    fn opens_and_closes_at_mid_with_fee() {
        tokio_test::block_on(async {
            let now = Utc::now();
            let core = BrokerCore::new(100.0, None);
            let state = Arc::new(MarketStateStore::new());
            let broker = PaperBroker::new(core, state.clone());

            let sig = signal("game-1", 0.44, 0.04, 4.0, now, Strategy::Fade);
            let position = broker.open(&sig, Strategy::Fade, now).await.unwrap();
            assert_eq!(position.side, Side::BuyNo);
            assert!(broker.has_position("game-1"));

            // Give the store a last-ask so get_current_executable_exit resolves.
            state.ingest(&pm_core::BboSample {
                slug: "game-1".to_string(),
                best_bid: 0.37,
                best_ask: 0.39,
                open_interest: 0.0,
                state: pm_core::MarketState::Open,
                received_at: now,
            }).unwrap();

            let (closed, pnl) = broker.close("game-1", "tp", now + chrono::Duration::seconds(10)).await.unwrap();
            assert_eq!(closed.slug, "game-1");
            assert!(pnl > 0.0, "expected a profitable close, got {pnl}");
            assert!(!broker.has_position("game-1"));
        });
    }

    #[test]
    fn rejects_open_when_discipline_gate_fails() {
        tokio_test::block_on(async {
            let now = Utc::now();
            let core = BrokerCore::new(100.0, None);
            let state = Arc::new(MarketStateStore::new());
            let broker = PaperBroker::new(core, state);

            let mut sig = signal("game-1", 0.44, 0.04, 2.0, now, Strategy::Fade); // abs_z below z_open
            sig.abs_z = 2.0;
            let position = broker.open(&sig, Strategy::Fade, now).await;
            assert!(position.is_none());
        });
    }
}
